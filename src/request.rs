// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求解析模块
//!
//! 该模块负责把客户端逐行发送的原始请求解析为代理需要的信息：
//! 1. 行的分类：请求行、由代理自行合成的默认头、需要原样转发的任意头、空行。
//! 2. 请求行（Request-Line）的解析：从 `GET http://host[:port]/path HTTP/1.x`
//!    中提取主机、端口和路径，并把版本号强制改写为 HTTP/1.0。
//! 3. 带长度上限的异步逐行读取。
//! 4. 缓存标签（tag）的计算。

use bytes::Bytes;
use log::{debug, error};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{exception::Exception, param::*};

/// 客户端发来的一行属于哪一类。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKind {
    /// 以 `GET ` 开头的请求行
    RequestLine,
    /// `User-Agent:`、`Host:`、`Connection:`、`Proxy-Connection:`，由代理自行合成，不转发
    DefaultHeader,
    /// 其他请求头，原样转发给源站
    Arbitrary,
    /// 只有换行符的空行，标志请求头结束
    Blank,
}

impl LineKind {
    /// 对一行（包含行尾的换行符）进行分类。
    ///
    /// 默认头的匹配不区分大小写。
    pub fn classify(line: &[u8]) -> Self {
        if line == CRLF.as_bytes() || line == b"\n" {
            return LineKind::Blank;
        }
        if line.starts_with(b"GET ") {
            return LineKind::RequestLine;
        }
        let is_default = DEFAULT_HEADERS.iter().any(|name| {
            line.len() >= name.len() && line[..name.len()].eq_ignore_ascii_case(name.as_bytes())
        });
        if is_default {
            LineKind::DefaultHeader
        } else {
            LineKind::Arbitrary
        }
    }
}

/// 从请求行中解析出的转发目标。
///
/// 会话结束后即被丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP 请求方法，目前只有 GET
    method: HttpRequestMethod,
    /// 源站主机名
    host: String,
    /// 源站端口，未指定时为 `"80"`
    port: String,
    /// 改写后的路径，末尾带有 `HTTP/1.0` 版本标记
    path: String,
}

impl Request {
    /// 解析一条请求行（包含行尾的 CRLF）。
    ///
    /// # 逻辑步骤
    /// 1. 找到 URL 中的 `//`，其后即为主机部分。
    /// 2. 复制主机名，直到遇到 `/` 或 `:`。
    /// 3. 如果紧跟着 `:`，则读取端口直到 `/`；否则使用默认端口 80。
    /// 4. 剩下的部分（不含 CRLF）作为路径，并把末尾 `HTTP/1.x` 的 `x` 改写为 `0`。
    ///
    /// # 错误处理
    /// 任何结构上的缺失都会返回属于畸形请求一类的 `Exception`。
    pub fn parse_request_line(line: &[u8], id: u128) -> Result<Self, Exception> {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求行", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };
        let text = text.strip_suffix(CRLF).ok_or(Exception::UnterminatedLine)?;
        let text = text
            .strip_prefix("GET ")
            .ok_or(Exception::MissingRequestLine)?;

        // 1. 定位 "//"
        let authority_start = match text.find(SCHEME_SEPARATOR) {
            Some(pos) => pos + SCHEME_SEPARATOR.len(),
            None => {
                debug!("[ID{}]请求行中没有'//'：{}", id, text);
                return Err(Exception::MissingSchemeSeparator);
            }
        };
        let authority = &text[authority_start..];

        // 2. 主机名
        let host_end = authority
            .find(|c: char| c == '/' || c == ':' || c == ' ')
            .unwrap_or(authority.len());
        let host = &authority[..host_end];
        if host.is_empty() {
            return Err(Exception::EmptyHost);
        }

        // 3. 端口
        let mut rest = &authority[host_end..];
        let port = match rest.strip_prefix(':') {
            Some(after_colon) => {
                let port_end = after_colon
                    .find(|c: char| c == '/' || c == ' ')
                    .unwrap_or(after_colon.len());
                let port = &after_colon[..port_end];
                if port.parse::<u16>().is_err() || !port.bytes().all(|b| b.is_ascii_digit()) {
                    debug!("[ID{}]非法的端口：{}", id, port);
                    return Err(Exception::InvalidPort);
                }
                rest = &after_colon[port_end..];
                port.to_string()
            }
            None => DEFAULT_PORT.to_string(),
        };

        // 4. 路径与版本
        let path = force_http_1_0(rest)?;

        Ok(Self {
            method: HttpRequestMethod::Get,
            host: host.to_string(),
            port,
            path,
        })
    }

    /// 缓存标签：主机、端口与改写后路径直接拼接，中间没有分隔符。
    pub fn tag(&self) -> String {
        [self.host.as_str(), self.port.as_str(), self.path.as_str()].concat()
    }
}

/// 把 `"/path HTTP/1.x"` 改写为 `"/path HTTP/1.0"`。
///
/// 这是对版本号的文本补丁，只要求末尾是合法的 `HTTP/1.x`。
/// 没有路径时（`http://host HTTP/1.1`）补上 `/`。
fn force_http_1_0(rest: &str) -> Result<String, Exception> {
    let (target, version) = rest
        .rsplit_once(' ')
        .ok_or(Exception::MissingHttpVersion)?;
    let well_formed = version.len() == "HTTP/1.x".len()
        && version.starts_with("HTTP/1.")
        && version.bytes().last().map_or(false, |b| b.is_ascii_digit());
    if !well_formed {
        return Err(Exception::MissingHttpVersion);
    }

    let mut path = String::with_capacity(rest.len() + 1);
    if target.is_empty() {
        path.push('/');
    }
    path.push_str(&rest[..rest.len() - 1]);
    path.push('0');
    Ok(path)
}

/// 从客户端读取一行（包含换行符），单行最多 `max` 字节。
///
/// 连接在行边界处关闭时返回 `Ok(None)`。
pub async fn read_line<R>(reader: &mut R, max: usize) -> Result<Option<Bytes>, Exception>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(max as u64)
        .read_until(b'\n', &mut buf)
        .await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if n >= max {
            return Err(Exception::LineTooLong);
        }
        return Err(Exception::UnterminatedLine);
    }
    Ok(Some(Bytes::from(buf)))
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取源站主机名
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 获取源站端口
    pub fn port(&self) -> &str {
        &self.port
    }

    /// 获取改写后的路径
    pub fn path(&self) -> &str {
        &self.path
    }
}
