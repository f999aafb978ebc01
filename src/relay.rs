// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 会话转发模块
//!
//! 每个客户端连接对应一个会话，会话按以下状态推进：
//!
//! ```text
//! 解析请求 ─┬─ 缓存命中 ──> 直接返回缓存内容 ───────────────┐
//!           └─ 缓存未命中 ─> 连接源站 ─> 流式转发响应 ─> 尝试缓存 ─┴─> 关闭
//! ```
//!
//! - 命中时不再读取客户端剩余的请求头。
//! - 未命中时先把请求行和固定请求头发给源站，之后每读到一个其他请求头就立即转发，
//!   读到空行后再发送结束空行。
//! - 源站已被告知 `Connection: close`，因此以 EOF 作为响应结束的标志。响应边读边写给客户端，
//!   同时在不超过单对象上限的前提下复制一份，结束后放入缓存。

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::{
    io::{self, AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::timeout,
};

use crate::{
    builder::OutboundRequest,
    cache::{self, SharedCache},
    config::Config,
    exception::Exception,
    request::{read_line, LineKind, Request},
    util::error_response,
};

/// 会话的结果，交给调度器记录日志。
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// 直接返回了缓存内容
    CacheHit { tag: String, bytes: usize },
    /// 从源站转发，`cached` 表示响应是否被放入缓存
    Relayed {
        tag: String,
        bytes: usize,
        cached: bool,
    },
}

impl SessionOutcome {
    pub fn tag(&self) -> &str {
        match self {
            SessionOutcome::CacheHit { tag, .. } => tag,
            SessionOutcome::Relayed { tag, .. } => tag,
        }
    }

    pub fn bytes(&self) -> usize {
        match self {
            SessionOutcome::CacheHit { bytes, .. } => *bytes,
            SessionOutcome::Relayed { bytes, .. } => *bytes,
        }
    }
}

/// 缓存未命中时，会话持有的出站连接
struct MissPath {
    tag: String,
    origin: TcpStream,
    outbound: OutboundRequest,
}

/// 响应的副本，超过上限后停止复制，但仍继续计数
struct Capture {
    buf: BytesMut,
    total: usize,
    limit: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            total: 0,
            limit,
        }
    }

    fn record(&mut self, chunk: &[u8]) {
        if self.total + chunk.len() <= self.limit {
            self.buf.extend_from_slice(chunk);
        }
        self.total += chunk.len();
    }

    fn total(&self) -> usize {
        self.total
    }

    /// 完整且不超过上限时返回副本
    fn into_body(self) -> Option<Bytes> {
        if self.total <= self.limit {
            Some(self.buf.freeze())
        } else {
            None
        }
    }
}

/// # 连接处理器
///
/// 处理一个客户端连接的完整生命周期。出错时只影响本会话：
/// 出站连接和客户端连接都会被关闭，不完整的响应不会被缓存。
pub async fn handle_connection<S>(
    stream: S,
    id: u128,
    cache: SharedCache,
    config: Arc<Config>,
) -> Result<SessionOutcome, Exception>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = io::split(stream);
    let mut reader = BufReader::new(read_half);

    let result = relay(&mut reader, &mut write_half, id, &cache, &config).await;

    if let Err(e) = &result {
        // 此时还没有向客户端写入任何内容
        let code = if e.is_malformed() {
            Some(400)
        } else if e.is_outbound() {
            Some(502)
        } else {
            None
        };
        if let (Some(code), true) = (code, config.error_responses()) {
            debug!("[ID{}]向客户端返回{}", id, code);
            if let Err(e) = write_half.write_all(&error_response(code)).await {
                debug!("[ID{}]无法写入错误响应：{}", id, e);
            }
        }
    }
    if let Err(e) = write_half.shutdown().await {
        debug!("[ID{}]关闭客户端写端失败：{}", id, e);
    }
    result
}

async fn relay<R, W>(
    reader: &mut R,
    client: &mut W,
    id: u128,
    cache: &SharedCache,
    config: &Config,
) -> Result<SessionOutcome, Exception>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut miss: Option<MissPath> = None;

    // 1. 逐行解析客户端请求，直到空行
    loop {
        let line = match read_line(reader, config.max_line_length()).await? {
            Some(line) => line,
            None => {
                debug!("[ID{}]客户端在空行之前关闭了写端", id);
                break;
            }
        };
        match LineKind::classify(&line) {
            LineKind::Blank => break,
            LineKind::RequestLine => {
                if miss.is_some() {
                    return Err(Exception::DuplicateRequestLine);
                }
                let request = Request::parse_request_line(&line, id)?;
                let tag = request.tag();
                debug!("[ID{}]请求标签：{}", id, tag);

                let hit = cache::lock(cache).lookup(&tag);
                if let Some(cached) = hit {
                    debug!("[ID{}]缓存命中，大小: {} bytes", id, cached.size());
                    client.write_all(&cached.body).await?;
                    client.flush().await?;
                    return Ok(SessionOutcome::CacheHit {
                        tag,
                        bytes: cached.size(),
                    });
                }

                debug!("[ID{}]缓存未命中，连接源站{}:{}", id, request.host(), request.port());
                let mut origin = connect(&request, id, config).await?;
                let outbound = OutboundRequest::from_request(&request, config.user_agent());
                origin.write_all(&outbound.head()).await?;
                miss = Some(MissPath {
                    tag,
                    origin,
                    outbound,
                });
            }
            // 请求行之前出现的任何请求头都视为畸形请求
            LineKind::DefaultHeader | LineKind::Arbitrary if miss.is_none() => {
                return Err(Exception::MissingRequestLine);
            }
            LineKind::DefaultHeader => {
                debug!("[ID{}]忽略默认请求头", id);
            }
            LineKind::Arbitrary => {
                if let Some(path) = miss.as_mut() {
                    path.origin.write_all(&line).await?;
                }
            }
        }
    }

    let MissPath {
        tag,
        mut origin,
        outbound,
    } = miss.ok_or(Exception::MissingRequestLine)?;
    origin.write_all(outbound.terminator()).await?;
    debug!("[ID{}]请求已发送至源站", id);

    // 2. 流式转发响应
    let capture = stream_response(&mut origin, client, id, config).await?;
    let bytes = capture.total();

    // 3. 尝试缓存
    let cached = match capture.into_body() {
        Some(body) => match cache::lock(cache).insert(&tag, body) {
            Ok(index) => {
                debug!("[ID{}]响应已放入缓存行{}", id, index);
                true
            }
            Err(e) => {
                warn!("[ID{}]无法缓存响应: {}", id, e);
                false
            }
        },
        None => {
            debug!("[ID{}]响应大小{}超过上限，不缓存", id, bytes);
            false
        }
    };

    Ok(SessionOutcome::Relayed { tag, bytes, cached })
}

async fn connect(request: &Request, id: u128, config: &Config) -> Result<TcpStream, Exception> {
    let addr = format!("{}:{}", request.host(), request.port());
    let connecting = TcpStream::connect(addr.as_str());
    let result = match config.origin_timeout() {
        Some(limit) => match timeout(limit, connecting).await {
            Ok(result) => result,
            Err(_) => {
                warn!("[ID{}]连接源站{}超时", id, addr);
                return Err(Exception::OutboundTimeout);
            }
        },
        None => connecting.await,
    };
    result.map_err(|e| {
        warn!("[ID{}]无法连接到源站{}：{}", id, addr, e);
        Exception::OutboundConnectFailed
    })
}

async fn stream_response<O, W>(
    origin: &mut O,
    client: &mut W,
    id: u128,
    config: &Config,
) -> Result<Capture, Exception>
where
    O: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut capture = Capture::new(config.max_object_size());
    let mut chunk = vec![0u8; config.chunk_size()];
    loop {
        let n = match config.origin_timeout() {
            Some(limit) => match timeout(limit, origin.read(&mut chunk)).await {
                Ok(read) => read?,
                Err(_) => {
                    warn!("[ID{}]读取源站响应超时", id);
                    return Err(Exception::StreamIo(io::ErrorKind::TimedOut));
                }
            },
            None => origin.read(&mut chunk).await?,
        };
        if n == 0 {
            break;
        }
        client.write_all(&chunk[..n]).await?;
        capture.record(&chunk[..n]);
    }
    client.flush().await?;
    debug!("[ID{}]流式传输完成，共发送 {} 字节", id, capture.total());
    Ok(capture)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;

    #[test]
    fn test_capture_within_limit() {
        let mut capture = Capture::new(8);
        capture.record(b"abc");
        capture.record(b"defgh");
        assert_eq!(capture.total(), 8);
        assert_eq!(capture.into_body(), Some(Bytes::from_static(b"abcdefgh")));
    }

    #[test]
    fn test_capture_over_limit() {
        let mut capture = Capture::new(8);
        capture.record(b"abcdef");
        capture.record(b"ghi");
        // 超过上限后，即使后续块很小也不再复制
        capture.record(b"j");
        assert_eq!(capture.total(), 10);
        assert_eq!(capture.into_body(), None);
    }

    #[test]
    fn test_capture_empty() {
        let capture = Capture::new(8);
        assert_eq!(capture.into_body(), Some(Bytes::new()));
    }

    #[tokio::test]
    async fn test_hit_served_from_cache() {
        let cache = ResponseCache::new().shared();
        cache::lock(&cache)
            .insert("example.com80/ HTTP/1.0", Bytes::from_static(b"cached"))
            .unwrap();

        let (mut client, proxy) = io::duplex(1024);
        client
            .write_all(b"GET http://example.com/ HTTP/1.1\r\nAccept: */*\r\n\r\n")
            .await
            .unwrap();

        let outcome = handle_connection(proxy, 0, cache.clone(), Arc::new(Config::new()))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::CacheHit {
                tag: "example.com80/ HTTP/1.0".to_string(),
                bytes: 6
            }
        );

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"cached");
    }

    #[tokio::test]
    async fn test_hit_leaves_headers_unread() {
        let cache = ResponseCache::new().shared();
        cache::lock(&cache)
            .insert("example.com80/ HTTP/1.0", Bytes::from_static(b"cached"))
            .unwrap();

        let mut reader =
            BufReader::new(&b"GET http://example.com/ HTTP/1.1\r\nAccept: */*\r\n\r\n"[..]);
        let mut client = Vec::new();
        let outcome = relay(&mut reader, &mut client, 0, &cache, &Config::new())
            .await
            .unwrap();
        assert!(matches!(outcome, SessionOutcome::CacheHit { bytes: 6, .. }));
        assert_eq!(client, b"cached");

        // 命中后请求行之后的内容原样留在读取端
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"Accept: */*\r\n\r\n");
    }

    #[tokio::test]
    async fn test_default_header_before_request_line() {
        let cache = ResponseCache::new().shared();
        let (mut client, proxy) = io::duplex(1024);
        client
            .write_all(b"Host: example.com\r\nGET http://example.com/ HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let result = handle_connection(proxy, 0, cache, Arc::new(Config::new())).await;
        assert_eq!(result.unwrap_err(), Exception::MissingRequestLine);
    }

    #[tokio::test]
    async fn test_header_before_request_line() {
        let cache = ResponseCache::new().shared();
        let (mut client, proxy) = io::duplex(1024);
        client
            .write_all(b"Accept: */*\r\nGET http://example.com/ HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let result = handle_connection(proxy, 0, cache, Arc::new(Config::new())).await;
        assert_eq!(result.unwrap_err(), Exception::MissingRequestLine);
    }

    #[tokio::test]
    async fn test_malformed_with_error_response() {
        let cache = ResponseCache::new().shared();
        let config = Config::from_toml_str("error_responses = true").unwrap();
        let (mut client, proxy) = io::duplex(4096);
        client
            .write_all(b"GET /no-scheme HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let result = handle_connection(proxy, 0, cache, Arc::new(config)).await;
        assert_eq!(result.unwrap_err(), Exception::MissingSchemeSeparator);

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.starts_with(b"HTTP/1.0 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_empty_connection() {
        let cache = ResponseCache::new().shared();
        let (client, proxy) = io::duplex(64);
        drop(client);

        let result = handle_connection(proxy, 0, cache, Arc::new(Config::new())).await;
        assert_eq!(result.unwrap_err(), Exception::MissingRequestLine);
    }
}
