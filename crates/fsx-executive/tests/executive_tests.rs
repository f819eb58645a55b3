//! Integration tests for the executive services over an in-memory PSP

use fsx_cds::{CdsConfig, CdsError, CrcAlgorithm};
use fsx_executive::*;
use fsx_hal::MemoryPsp;
use fsx_pool::PoolError;
use fsx_resource::SlotError;

const MEDIA_SIZE: usize = 8192;

fn config() -> PlatformConfig {
    PlatformConfig {
        max_apps: 4,
        max_tasks: 6,
        max_gen_counters: 2,
        max_mem_pools: 2,
        cds: CdsConfig {
            max_entries: 8,
            block_sizes: vec![16, 64, 128, 512],
            crc: CrcAlgorithm::Crc16,
        },
        ..PlatformConfig::default()
    }
}

fn boot(psp: MemoryPsp) -> Executive<MemoryPsp> {
    Executive::new(psp, config()).unwrap()
}

fn syslog_has(es: &Executive<MemoryPsp>, text: &str) -> bool {
    es.syslog_entries().iter().any(|e| e.message.contains(text))
}

// ============================================================================
// Startup
// ============================================================================

#[test]
fn test_rejects_invalid_config() {
    let bad = PlatformConfig {
        max_apps: 0,
        ..config()
    };
    assert!(matches!(
        Executive::new(MemoryPsp::new(MEDIA_SIZE), bad),
        Err(EsError::Config(ConfigError::Zero("max_apps")))
    ));
}

#[test]
fn test_fresh_media_is_initialized() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    assert!(es.cds_available());
    assert_eq!(es.cds_startup(), Some(CdsStartup::Reinitialized));
    assert_eq!(es.cds_registry().unwrap(), []);
    assert!(syslog_has(&es, "cds: initialized"));
}

#[test]
fn test_small_media_leaves_cds_unavailable() {
    let es = boot(MemoryPsp::new(64));
    assert!(!es.cds_available());
    assert_eq!(es.cds_startup(), None);
    assert!(syslog_has(&es, "cds: unavailable"));

    let app = es.register_app("SC", AppType::External).unwrap();
    assert_eq!(
        es.register_cds(app, "STATE", 32),
        Err(EsError::CdsUnavailable)
    );
    assert!(es.take_psp().is_none());

    // Everything else keeps working
    let counter = es.register_counter("HITS").unwrap();
    es.increment_counter(counter).unwrap();
    assert_eq!(es.counter_value(counter), Ok(1));
}

// ============================================================================
// Applications, Libraries and Tasks
// ============================================================================

#[test]
fn test_app_registry() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    let hk = es.register_app("HK", AppType::Core).unwrap();
    assert_ne!(sc, hk);

    assert_eq!(es.app_id_by_name("HK"), Ok(hk));
    assert_eq!(es.app_name(sc), Ok(String::from("SC")));
    assert_eq!(es.app_type(hk), Ok(AppType::Core));
    assert_eq!(es.app_count(), 2);

    assert_eq!(
        es.register_app("SC", AppType::External),
        Err(EsError::DuplicateName("SC".into()))
    );
    assert_eq!(
        es.register_app("", AppType::External),
        Err(EsError::InvalidName(String::new()))
    );
    assert_eq!(
        es.app_id_by_name("MM"),
        Err(EsError::NameNotFound("MM".into()))
    );
}

#[test]
fn test_app_table_exhaustion() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    for name in ["A1", "A2", "A3", "A4"] {
        es.register_app(name, AppType::External).unwrap();
    }
    assert!(matches!(
        es.register_app("A5", AppType::External),
        Err(EsError::Slot(SlotError::NoFreeSlots(_)))
    ));
}

#[test]
fn test_deleted_app_handle_goes_stale() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let first = es.register_app("SC", AppType::External).unwrap();
    es.delete_app(first).unwrap();

    let second = es.register_app("SC", AppType::External).unwrap();
    assert_ne!(first, second);
    assert_eq!(es.app_name(first), Err(EsError::InvalidId(first.0)));
    assert_eq!(es.delete_app(first), Err(EsError::InvalidId(first.0)));
}

#[test]
fn test_delete_app_releases_tasks_and_pools() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    let hk = es.register_app("HK", AppType::External).unwrap();

    let main = es.create_task("SC_MAIN", sc).unwrap();
    let child = es.create_task("SC_CHILD", sc).unwrap();
    let other = es.create_task("HK_MAIN", hk).unwrap();
    let pool = es.pool_create(sc, 1024, Some(&[32, 128][..])).unwrap();
    assert_eq!(es.task_count(), 3);

    es.delete_app(sc).unwrap();
    assert!(es.task_name(main).is_err());
    assert!(es.task_name(child).is_err());
    assert!(!es.validate_pool_handle(pool));
    assert_eq!(es.task_name(other), Ok(String::from("HK_MAIN")));
    assert_eq!(es.pool_count(), 0);
    assert!(syslog_has(&es, "deleted app SC (2 tasks, 1 pools)"));
}

#[test]
fn test_task_registry() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();

    let task = es.create_task("SC_MAIN", sc).unwrap();
    assert_eq!(es.task_id_by_name("SC_MAIN"), Ok(task));
    assert_eq!(
        es.task_info(task),
        Ok(TaskInfo {
            task_id: task,
            name: String::from("SC_MAIN"),
            app_id: sc,
            app_name: String::from("SC"),
        })
    );

    assert_eq!(
        es.create_task("ORPHAN", AppId::UNDEFINED),
        Err(EsError::InvalidId(AppId::UNDEFINED.0))
    );
    assert_eq!(
        es.create_task("SC_MAIN", sc),
        Err(EsError::DuplicateName("SC_MAIN".into()))
    );

    es.delete_task(task).unwrap();
    assert_eq!(es.delete_task(task), Err(EsError::InvalidId(task.0)));
    assert!(es.task_id_by_name("SC_MAIN").is_err());
}

#[test]
fn test_lib_registry() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let lib = es.register_lib("CFS_LIB").unwrap();
    assert_eq!(es.lib_id_by_name("CFS_LIB"), Ok(lib));
    assert_eq!(es.lib_name(lib), Ok(String::from("CFS_LIB")));
    assert_eq!(es.lib_count(), 1);
    assert_eq!(
        es.register_lib("CFS_LIB"),
        Err(EsError::DuplicateName("CFS_LIB".into()))
    );
}

// ============================================================================
// Generic Counters
// ============================================================================

#[test]
fn test_counters() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let hits = es.register_counter("HITS").unwrap();
    let miss = es.register_counter("MISS").unwrap();

    es.increment_counter(hits).unwrap();
    es.increment_counter(hits).unwrap();
    es.set_counter(miss, 40).unwrap();
    assert_eq!(es.counter_value(hits), Ok(2));
    assert_eq!(es.counter_value(miss), Ok(40));
    assert_eq!(es.counter_id_by_name("MISS"), Ok(miss));
    assert_eq!(es.counter_name(hits), Ok(String::from("HITS")));

    assert!(matches!(
        es.register_counter("THIRD"),
        Err(EsError::Slot(SlotError::NoFreeSlots(_)))
    ));

    es.delete_counter(hits).unwrap();
    assert_eq!(es.counter_value(hits), Err(EsError::InvalidId(hits.0)));
    assert_eq!(
        es.register_counter("MISS"),
        Err(EsError::DuplicateName("MISS".into()))
    );
}

// ============================================================================
// Memory Pools
// ============================================================================

#[test]
fn test_pool_buffers() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    let pool = es.pool_create(sc, 2048, Some(&[128, 32][..])).unwrap();

    let buf = es.get_pool_buf(pool, 100).unwrap();
    assert_eq!(es.get_pool_buf_info(pool, buf), Ok(100));

    es.write_pool_buf(pool, buf, b"telemetry frame").unwrap();
    let mut out = [0u8; 15];
    es.read_pool_buf(pool, buf, &mut out).unwrap();
    assert_eq!(&out, b"telemetry frame");

    assert_eq!(
        es.write_pool_buf(pool, buf, &[0u8; 101]),
        Err(EsError::BadArgument("data larger than buffer"))
    );

    assert_eq!(es.put_pool_buf(pool, buf), Ok(100));
    assert!(matches!(
        es.put_pool_buf(pool, buf),
        Err(EsError::Pool(PoolError::Corrupt(_)))
    ));

    // Freed block is handed out again first
    let again = es.get_pool_buf(pool, 90).unwrap();
    assert_eq!(again, buf);

    let stats = es.mem_pool_stats(pool).unwrap();
    assert_eq!(stats.pool_size, 2048);
    assert_eq!(stats.blocks_requested, 1);
    assert_eq!(stats.check_err_count, 1);
    assert_eq!(stats.block_stats.len(), 2);
    assert_eq!(stats.block_stats[0].block_size, 32);
    assert_eq!(stats.block_stats[1].num_created, 1);
}

#[test]
fn test_pool_create_arguments() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();

    assert_eq!(
        es.pool_create(sc, 8, Some(&[32][..])),
        Err(EsError::BadArgument("pool size"))
    );
    assert_eq!(
        es.pool_create(sc, 4096, Some(&[][..])),
        Err(EsError::BadArgument("block sizes"))
    );
    assert_eq!(
        es.pool_create(sc, 4096, Some(&[0, 32][..])),
        Err(EsError::BadArgument("block sizes"))
    );
    assert_eq!(
        es.pool_create(AppId::UNDEFINED, 4096, None),
        Err(EsError::InvalidId(AppId::UNDEFINED.0))
    );

    // Default bucket list
    let pool = es.pool_create(sc, 4096, None).unwrap();
    let stats = es.mem_pool_stats(pool).unwrap();
    assert_eq!(stats.block_stats.len(), DEFAULT_MEM_BLOCK_SIZES.len());
}

#[test]
fn test_pool_table_and_space_exhaustion() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    let small = es.pool_create(sc, 256, Some(&[64][..])).unwrap();
    let _second = es.pool_create(sc, 256, Some(&[64][..])).unwrap();

    assert!(matches!(
        es.pool_create(sc, 256, Some(&[64][..])),
        Err(EsError::Slot(SlotError::NoFreeSlots(_)))
    ));

    let mut granted = 0;
    let err = loop {
        match es.get_pool_buf(small, 64) {
            Ok(_) => granted += 1,
            Err(e) => break e,
        }
    };
    assert_eq!(granted, 3);
    assert!(matches!(err, EsError::Pool(PoolError::PoolFull { .. })));
    assert!(matches!(
        es.get_pool_buf(small, 65),
        Err(EsError::Pool(PoolError::NoFit { .. }))
    ));

    es.pool_delete(small).unwrap();
    assert_eq!(es.get_pool_buf(small, 8), Err(EsError::InvalidId(small.0)));
    assert!(es.pool_create(sc, 256, Some(&[64][..])).is_ok());
}

// ============================================================================
// Critical Data Store
// ============================================================================

#[test]
fn test_cds_survives_restart() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();

    let reg = es.register_cds(sc, "STATE", 100).unwrap();
    assert!(matches!(reg, CdsRegistration::Created(_)));
    let handle = reg.handle();
    let state: Vec<u8> = (0..100u8).collect();
    es.copy_to_cds(handle, &state).unwrap();
    assert_eq!(es.cds_block_name(handle), Ok(String::from("SC.STATE")));

    let psp = es.take_psp().unwrap();
    assert!(!es.cds_available());

    let es = boot(psp);
    assert_eq!(es.cds_startup(), Some(CdsStartup::Recovered));
    assert!(syslog_has(&es, "cds: recovered 1 blocks"));

    let sc = es.register_app("SC", AppType::External).unwrap();
    assert_eq!(
        es.register_cds(sc, "STATE", 100),
        Ok(CdsRegistration::AlreadyExists(handle))
    );
    assert_eq!(es.cds_block_id_by_name("SC.STATE"), Ok(handle));

    let mut out = vec![0u8; 100];
    es.restore_from_cds(handle, &mut out).unwrap();
    assert_eq!(out, state);
}

#[test]
fn test_cds_corruption_is_reported() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    let handle = es.register_cds(sc, "STATE", 16).unwrap().handle();
    es.copy_to_cds(handle, &[7u8; 16]).unwrap();

    let info = es.cds_registry().unwrap();
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].user_size, 16);
    let data_offset = info[0].block_offset + fsx_cds::BLOCK_HEADER_SIZE;

    let mut psp = es.take_psp().unwrap();
    psp.bytes_mut()[data_offset] ^= 0xFF;
    let es = boot(psp);

    let mut out = [0u8; 16];
    let err = es.restore_from_cds(handle, &mut out).unwrap_err();
    assert!(matches!(err, EsError::Cds(CdsError::CrcMismatch { .. })));
    assert_eq!(out, [0u8; 16]);
    assert!(syslog_has(&es, "restore_from_cds"));
}

#[test]
fn test_cds_names_and_sizes() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();

    assert_eq!(
        es.register_cds(sc, "", 16),
        Err(EsError::InvalidName(String::new()))
    );
    let long = "L".repeat(fsx_cds::CDS_MAX_NAME_LEN);
    assert_eq!(
        es.register_cds(sc, &long, 16),
        Err(EsError::InvalidName(long.clone()))
    );
    assert!(matches!(
        es.register_cds(sc, "STATE", 0),
        Err(EsError::Cds(CdsError::InvalidSize(0)))
    ));
    assert!(matches!(
        es.register_cds(AppId::UNDEFINED, "STATE", 16),
        Err(EsError::InvalidId(_))
    ));

    let handle = es.register_cds(sc, "STATE", 16).unwrap().handle();
    assert!(matches!(
        es.copy_to_cds(handle, &[0u8; 15]),
        Err(EsError::Cds(CdsError::InvalidSize(15)))
    ));
}

#[test]
fn test_cds_full_name_checked_before_store() {
    let es = boot(MemoryPsp::new(64));
    assert!(!es.cds_available());

    assert_eq!(
        es.register_cds_ex("SC.STATE", 0, false),
        Err(EsError::Cds(CdsError::InvalidSize(0)))
    );
    let too_big = fsx_cds::MAX_USER_BLOCK_SIZE + 1;
    assert_eq!(
        es.register_cds_ex("SC.STATE", too_big, false),
        Err(EsError::Cds(CdsError::InvalidSize(too_big)))
    );
    let long = "L".repeat(fsx_cds::CDS_MAX_FULL_NAME_LEN);
    assert_eq!(
        es.register_cds_ex(&long, 16, true),
        Err(EsError::InvalidName(long.clone()))
    );
    assert_eq!(
        es.register_cds_ex("", 16, true),
        Err(EsError::InvalidName(String::new()))
    );
    assert!(syslog_has(&es, "register_cds: SC.STATE"));

    // Well-formed requests still need the store
    assert_eq!(
        es.register_cds_ex("SC.STATE", 16, false),
        Err(EsError::CdsUnavailable)
    );
}

#[test]
fn test_cds_delete_rules() {
    let es = boot(MemoryPsp::new(MEDIA_SIZE));
    let sc = es.register_app("SC", AppType::External).unwrap();
    es.register_cds(sc, "STATE", 32).unwrap();
    es.register_cds_ex("TBL.PARAMS", 32, true).unwrap();

    assert_eq!(
        es.delete_cds("SC.STATE", false),
        Err(EsError::Cds(CdsError::OwnerActive("SC.STATE".into())))
    );
    assert_eq!(
        es.delete_cds("SC.STATE", true),
        Err(EsError::Cds(CdsError::WrongType("SC.STATE".into())))
    );
    assert_eq!(
        es.delete_cds("SC.NOPE", false),
        Err(EsError::NameNotFound("SC.NOPE".into()))
    );

    es.delete_app(sc).unwrap();
    es.delete_cds("SC.STATE", false).unwrap();
    es.delete_cds("TBL.PARAMS", true).unwrap();
    assert_eq!(es.cds_registry().unwrap(), []);
    assert_eq!(
        es.cds_block_id_by_name("SC.STATE"),
        Err(EsError::NameNotFound("SC.STATE".into()))
    );
}

// ============================================================================
// System Log
// ============================================================================

#[test]
fn test_syslog_discard_mode() {
    let config = PlatformConfig {
        syslog_size: 64,
        syslog_mode: SysLogMode::Discard,
        ..config()
    };
    // No CDS so startup leaves a known amount in the log
    let es = Executive::new(MemoryPsp::new(0), config).unwrap();
    es.syslog_clear();

    assert_eq!(es.syslog_write(&"a".repeat(20)), Ok(SysLogWrite::Written));
    assert_eq!(es.syslog_write(&"b".repeat(10)), Ok(SysLogWrite::Written));
    // 31 bytes left, enough for a fragment
    assert_eq!(es.syslog_write(&"c".repeat(32)), Ok(SysLogWrite::Truncated));
    assert_eq!(es.syslog_write("d"), Err(EsError::SysLogFull));

    es.syslog_set_mode(SysLogMode::Overwrite);
    assert_eq!(es.syslog_write("d"), Ok(SysLogWrite::Written));
    let entries = es.syslog_entries();
    assert_eq!(entries.last().map(|e| e.message.as_str()), Some("d"));
    assert!(!entries.iter().any(|e| e.message.starts_with('a')));
}

#[test]
fn test_syslog_json_export() {
    let es = Executive::new(MemoryPsp::new(0), config()).unwrap();
    es.syslog_clear();
    es.syslog_write("first").unwrap();
    es.syslog_write("second").unwrap();

    let json = es.syslog_json().unwrap();
    let entries: Vec<SysLogEntry> = serde_json::from_str(&json).unwrap();
    let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages, ["first", "second"]);
    assert!(entries[0].seq < entries[1].seq);
}
