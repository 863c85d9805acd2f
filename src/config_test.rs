use super::*;

// =============================================================================
// env_parse: unique keys per test to avoid races with parallel tests.
// =============================================================================

#[test]
fn env_parse_missing_returns_default() {
    let val: u64 = env_parse("__TEST_CFG_MISSING_4411__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__TEST_CFG_VALID_4412__", "99") };
    let val: usize = env_parse("__TEST_CFG_VALID_4412__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__TEST_CFG_VALID_4412__") };
}

#[test]
fn env_parse_trims_whitespace() {
    unsafe { std::env::set_var("__TEST_CFG_WS_4413__", "  17 ") };
    let val: u32 = env_parse("__TEST_CFG_WS_4413__", 0);
    assert_eq!(val, 17);
    unsafe { std::env::remove_var("__TEST_CFG_WS_4413__") };
}

#[test]
fn env_parse_invalid_returns_default() {
    unsafe { std::env::set_var("__TEST_CFG_INVALID_4414__", "lots") };
    let val: u16 = env_parse("__TEST_CFG_INVALID_4414__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__TEST_CFG_INVALID_4414__") };
}

#[test]
fn config_error_names_variable() {
    let err = ConfigError::Missing("DATABASE_URL");
    assert!(err.to_string().contains("DATABASE_URL"));
}
