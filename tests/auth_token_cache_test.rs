//! Token cache integration tests
//!
//! Exercise the on-disk layout through the public API only.

use tenantauth::{TenantAuthError, TokenCache, TokenRecord};

mod common;

#[test]
fn test_saved_record_is_reloadable_with_camel_case_layout() {
    let (_tmp, cache) = common::temp_cache();

    let saved = cache
        .save("proj_123", &TokenRecord::success("sess-X", "ref-X"))
        .unwrap();
    let loaded = cache.load("proj_123").unwrap();
    assert_eq!(loaded, saved);
    assert!(loaded.ok);

    let raw = std::fs::read_to_string(cache.dir().join("proj_123.json")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["sessionToken"], "sess-X");
    assert_eq!(json["refreshToken"], "ref-X");
}

#[test]
fn test_clear_all_removes_every_record() {
    let (_tmp, cache) = common::temp_cache();
    let tenants = ["proj_a", "proj_b", "proj_c", "proj_d"];
    for tenant in tenants {
        cache
            .save(tenant, &TokenRecord::success(format!("s-{tenant}"), "r"))
            .unwrap();
    }
    assert_eq!(cache.list().unwrap(), tenants.to_vec());

    assert_eq!(cache.clear_all().unwrap(), tenants.len());

    for tenant in tenants {
        assert!(cache.load(tenant).is_none());
    }
    assert!(cache.list().unwrap().is_empty());
}

#[test]
fn test_clear_all_keeps_unrelated_files() {
    let (_tmp, cache) = common::temp_cache();
    cache.save("proj_a", &TokenRecord::success("s", "r")).unwrap();
    let notes = cache.dir().join("notes.txt");
    std::fs::write(&notes, "keep me").unwrap();

    assert_eq!(cache.clear_all().unwrap(), 1);
    assert!(notes.exists());
}

#[test]
fn test_caches_in_different_directories_are_independent() {
    let (_a, first) = common::temp_cache();
    let (_b, second) = common::temp_cache();

    first.save("proj_1", &TokenRecord::success("one", "")).unwrap();

    assert!(second.load("proj_1").is_none());
    assert_eq!(first.load("proj_1").unwrap().session_token, "one");
}

#[test]
fn test_truncated_file_is_a_miss_and_can_be_overwritten() {
    let (_tmp, cache) = common::temp_cache();
    cache.save("proj_1", &TokenRecord::success("s", "r")).unwrap();
    std::fs::write(cache.dir().join("proj_1.json"), r#"{"ok":tr"#).unwrap();

    assert!(cache.load("proj_1").is_none());

    cache.save("proj_1", &TokenRecord::success("s2", "r2")).unwrap();
    assert_eq!(cache.load("proj_1").unwrap().session_token, "s2");
}

#[test]
fn test_path_like_tenant_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = TokenCache::new(tmp.path().join("tokens"));

    let err = cache
        .save("../outside", &TokenRecord::success("s", "r"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TenantAuthError>(),
        Some(TenantAuthError::Configuration(_))
    ));
    assert!(!tmp.path().join("outside.json").exists());
}
