use bytes::Bytes;

use crate::param::{HttpVersion, CRLF, STATUS_CODES};

pub fn status_reason(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("Unknown Status")
}

/// 代理自己生成的错误响应：HTTP/1.0 状态行，外加一个简短的 HTML 页面
pub fn error_response(code: u16) -> Bytes {
    let reason = status_reason(code);
    let page = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{code} {reason}</title></head>\
         <body><h1>{code} {reason}</h1><hr><p>cacheproxy</p></body></html>"
    );
    let head = [
        format!("{} {} {}", HttpVersion::V1_0, code, reason),
        "Content-Type: text/html;charset=utf-8".to_string(),
        format!("Content-Length: {}", page.len()),
        "Connection: close".to_string(),
    ]
    .join(CRLF);
    Bytes::from([head.as_str(), CRLF, CRLF, page.as_str()].concat())
}

// 日志里使用的可读字节数
pub fn format_bytes(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = KIB * 1024;
    match bytes {
        b if b >= MIB => format!("{:.1} MiB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.1} KiB", b as f64 / KIB as f64),
        b => format!("{} B", b),
    }
}
