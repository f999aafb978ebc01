// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 出站请求构建模块
//!
//! 根据解析出的 `Request` 构建发往源站的 HTTP/1.0 请求。请求头以有序列表保存，
//! 由一次序列化生成字节流，顺序固定为：
//!
//! ```text
//! GET <path>
//! Host: <host>:<port>
//! Connection: close
//! Proxy-Connection: close
//! User-Agent: <固定标识>
//! <客户端的其他请求头，按到达顺序>
//! <空行>
//! ```
//!
//! 客户端的其他请求头需要边读边转发，所以序列化被拆成 `head()` 和 `terminator()`
//! 两部分，中间由调用者写入这些请求头。

use bytes::{BufMut, Bytes, BytesMut};

use crate::{param::*, request::Request};

#[derive(Debug, Clone)]
pub struct OutboundRequest {
    method: HttpRequestMethod,
    path: String,
    headers: Vec<(&'static str, String)>,
}

impl OutboundRequest {
    pub fn from_request(request: &Request, user_agent: &str) -> Self {
        let headers = vec![
            ("Host", format!("{}:{}", request.host(), request.port())),
            // 关闭长连接，源站以 EOF 表示响应结束
            ("Connection", "close".to_string()),
            ("Proxy-Connection", "close".to_string()),
            ("User-Agent", user_agent.to_string()),
        ];
        Self {
            method: request.method(),
            path: request.path().to_string(),
            headers,
        }
    }

    /// 请求行加上代理合成的固定请求头。
    pub fn head(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_slice(format!("{} {}{}", self.method, self.path, CRLF).as_bytes());
        for (name, value) in &self.headers {
            buf.put_slice(format!("{}: {}{}", name, value, CRLF).as_bytes());
        }
        buf.freeze()
    }

    /// 结束请求的空行。
    pub fn terminator(&self) -> &'static [u8] {
        CRLF.as_bytes()
    }

    /// 完整的请求字节流，`extra` 为原样转发的请求行（包含 CRLF）。
    pub fn to_bytes<'a, I>(&self, extra: I) -> Bytes
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut buf = BytesMut::from(&self.head()[..]);
        for line in extra {
            buf.put_slice(line);
        }
        buf.put_slice(self.terminator());
        buf.freeze()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }
}
