use super::*;

#[test]
fn normalize_base_url_defaults_when_missing() {
    assert_eq!(normalize_base_url(None, DEFAULT_OPENAI_BASE_URL), DEFAULT_OPENAI_BASE_URL);
}

#[test]
fn normalize_base_url_defaults_when_blank() {
    assert_eq!(normalize_base_url(Some("   "), DEFAULT_GEMINI_BASE_URL), DEFAULT_GEMINI_BASE_URL);
}

#[test]
fn normalize_base_url_strips_trailing_slashes() {
    assert_eq!(normalize_base_url(Some("http://localhost:8080/v1//"), DEFAULT_OPENAI_BASE_URL), "http://localhost:8080/v1");
}

// Unique variable names per test so parallel tests never race on env.

#[test]
fn credentials_absent_without_key() {
    assert!(credentials("__TEST_LLM_KEY_ABSENT_551__", "__TEST_LLM_URL_ABSENT_551__", DEFAULT_OPENAI_BASE_URL).is_none());
}

#[test]
fn credentials_absent_with_blank_key() {
    unsafe { std::env::set_var("__TEST_LLM_KEY_BLANK_552__", "  ") };
    assert!(credentials("__TEST_LLM_KEY_BLANK_552__", "__TEST_LLM_URL_BLANK_552__", DEFAULT_OPENAI_BASE_URL).is_none());
    unsafe { std::env::remove_var("__TEST_LLM_KEY_BLANK_552__") };
}

#[test]
fn credentials_present_with_custom_url() {
    unsafe {
        std::env::set_var("__TEST_LLM_KEY_SET_553__", "secret");
        std::env::set_var("__TEST_LLM_URL_SET_553__", "https://proxy.internal/v1/");
    }
    let creds = credentials("__TEST_LLM_KEY_SET_553__", "__TEST_LLM_URL_SET_553__", DEFAULT_OPENAI_BASE_URL).unwrap();
    assert_eq!(creds.api_key, "secret");
    assert_eq!(creds.base_url, "https://proxy.internal/v1");
    unsafe {
        std::env::remove_var("__TEST_LLM_KEY_SET_553__");
        std::env::remove_var("__TEST_LLM_URL_SET_553__");
    }
}
