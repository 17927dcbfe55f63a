const PMM_URL: &str = "PMM_URL";

pub fn get_server_url() -> Option<String> {
    non_empty_var(PMM_URL)
}

const PMM_API_KEY: &str = "PMM_API_KEY";

pub fn get_api_key() -> Option<String> {
    non_empty_var(PMM_API_KEY)
}

const PMM_USER: &str = "PMM_USER";
const PMM_PASSWORD: &str = "PMM_PASSWORD";

/// Basic auth credentials, only if both user and password are set
pub fn get_basic_auth() -> Option<(String, String)> {
    Some((non_empty_var(PMM_USER)?, non_empty_var(PMM_PASSWORD)?))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
