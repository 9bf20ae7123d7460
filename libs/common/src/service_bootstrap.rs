//! Service metadata and startup banner

use tracing::info;

/// Service metadata for startup
pub struct ServiceInfo {
    /// Service name (e.g., "alarmsrv")
    pub name: String,
    /// Service version
    pub version: String,
    /// Service description
    pub description: String,
    /// Default admin API port
    pub default_port: u16,
}

impl ServiceInfo {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
        default_port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
            default_port,
        }
    }
}

/// Print startup banner
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "alarmsrv" => {
            r#"
  █████╗ ██╗      █████╗ ██████╗ ███╗   ███╗███████╗██████╗ ██╗   ██╗
 ██╔══██╗██║     ██╔══██╗██╔══██╗████╗ ████║██╔════╝██╔══██╗██║   ██║
 ███████║██║     ███████║██████╔╝██╔████╔██║███████╗██████╔╝██║   ██║
 ██╔══██║██║     ██╔══██║██╔══██╗██║╚██╔╝██║╚════██║██╔══██╗╚██╗ ██╔╝
 ██║  ██║███████╗██║  ██║██║  ██║██║ ╚═╝ ██║███████║██║  ██║ ╚████╔╝
 ╚═╝  ╚═╝╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚═╝     ╚═╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => "",
    };

    if !banner.is_empty() {
        info!("{}", banner);
    }
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
}
