// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 代理协议参数与常量模块
//!
//! 该模块定义了 `cacheproxy` 遵循的 HTTP/1.0 转发协议相关常量和数据结构，包括：
//! - 缓存容量相关的上限（单对象大小、总大小、缓存行数量）。
//! - 代理固定发送的标识头（`User-Agent`）以及会被抑制的默认请求头。
//! - 错误响应所用的状态码及其原因短语（Reason Phrase）。
//! - HTTP 方法与版本的强类型枚举。

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 缓存总大小的建议上限（字节）。仅作参考，不做强制检查。
pub const MAX_CACHE_SIZE: usize = 1049000;

/// 单个可缓存响应的最大字节数
pub const MAX_OBJECT_SIZE: usize = 102400;

/// 缓存行的固定数量
pub const CACHE_LINES: usize = 10;

/// 请求行未指定端口时使用的默认端口
pub const DEFAULT_PORT: &str = "80";

/// 请求行中 URL 的协议分隔符
pub const SCHEME_SEPARATOR: &str = "//";

/// 代理向源站发送的固定标识
pub const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:56.0) Gecko/20100101 Firefox/56.0";

/// 由代理自行合成、不会原样转发给源站的请求头
pub const DEFAULT_HEADERS: [&str; 4] = ["User-Agent:", "Host:", "Connection:", "Proxy-Connection:"];

lazy_static! {
    /// 代理可能主动返回给客户端的状态码及其原因短语。
    ///
    /// 参考标准：[RFC 1945: HTTP/1.0](https://www.rfc-editor.org/rfc/rfc1945.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(400, "Bad Request");
        map.insert(404, "Not Found");
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map
    };
}

/// 代理转发时使用的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    /// HTTP/1.0 版本。无论客户端声明什么版本，出站请求一律降级为 1.0
    V1_0,
}

/// 代理支持的 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源。这是唯一支持的方法
    Get,
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
        }
    }
}
