use crate::manifest::UpdateTarget;

/// Request line and headers for fetching the firmware image
pub fn build_get(target: &UpdateTarget) -> String {
    let path = if target.path.starts_with('/') {
        target.path.clone()
    } else {
        format!("/{}", target.path)
    };
    let host = if target.port == 80 {
        target.host.clone()
    } else {
        format!("{}:{}", target.host, target.port)
    };

    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        path, host
    )
}
