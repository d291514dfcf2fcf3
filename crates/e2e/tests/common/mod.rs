//! Shared setup for the integration suites
#![allow(dead_code)]

use bikegear_e2e::{BrowserConfig, BrowserSession, ServerConfig, ServerHandle, Viewport};

pub const EXPLORE: &str = r#"a[data-track="explore-collection"]"#;
pub const VIEW_GLASSES: &str = r#"a[data-track="view-glasses"]"#;
pub const SHOP_GLASSES: &str = r#"a[data-track="shop-glasses-collection"]"#;
pub const BACK_TO_HELMETS: &str = r#"a[data-track="back-to-helmets"]"#;
pub const VIEW_HELMETS: &str = r#"a[data-track="view-helmets-from-glasses"]"#;

pub async fn serve() -> ServerHandle {
    ServerHandle::spawn(ServerConfig::default()).await.unwrap()
}

pub fn session(server: &ServerHandle) -> BrowserSession {
    session_with(server, BrowserConfig::default())
}

pub fn mobile_session(server: &ServerHandle) -> BrowserSession {
    session_with(
        server,
        BrowserConfig {
            viewport: Viewport::MOBILE,
            ..BrowserConfig::default()
        },
    )
}

pub fn session_with(server: &ServerHandle, config: BrowserConfig) -> BrowserSession {
    BrowserSession::new(server.base_url(), config).unwrap()
}
