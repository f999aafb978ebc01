// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了代理在单个会话生命周期中可能出现的各类异常情况。
//!
//! ## 分类
//! - **畸形请求**：客户端请求缺少预期结构（无 `//`、行未终止、行过长等），只终止当前会话。
//! - **出站连接错误**：无法连接到源站，或连接/读取超时。
//! - **流 I/O 错误**：转发过程中任一端的读写失败。
//! - **配置错误**：配置文件不可读或格式不正确，记录日志后回退到默认配置。

use std::fmt;
use std::io;

/// 代理处理会话过程中发生的异常类型。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 某一行超过了单行缓冲区上限
    LineTooLong,
    /// 客户端在一行中途关闭了连接（没有换行符）
    UnterminatedLine,
    /// 在请求行之前出现了请求头，或者连接在请求行之前就结束了
    MissingRequestLine,
    /// 同一个连接中出现了第二个请求行
    DuplicateRequestLine,
    /// 请求行中的 URL 没有 `//`
    MissingSchemeSeparator,
    /// 请求行中的主机名为空
    EmptyHost,
    /// 端口不是合法的十进制数字
    InvalidPort,
    /// 请求行末尾没有 `HTTP/1.x` 版本标记
    MissingHttpVersion,
    /// 请求行无法解析为 UTF-8 字符串
    RequestIsNotUtf8,
    /// 无法连接到源站
    OutboundConnectFailed,
    /// 连接源站或读取源站响应超时
    OutboundTimeout,
    /// 转发过程中的读写错误
    StreamIo(io::ErrorKind),
    /// 待缓存的响应超过单对象大小上限
    ObjectTooLarge,
    /// 配置文件无法读取
    ConfigUnreadable,
    /// 配置文件内容不合法
    ConfigInvalid,
}

use Exception::*;

impl Exception {
    /// 是否属于畸形请求一类。
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            LineTooLong
                | UnterminatedLine
                | MissingRequestLine
                | DuplicateRequestLine
                | MissingSchemeSeparator
                | EmptyHost
                | InvalidPort
                | MissingHttpVersion
                | RequestIsNotUtf8
        )
    }

    /// 是否属于出站连接失败一类。
    pub fn is_outbound(&self) -> bool {
        matches!(self, OutboundConnectFailed | OutboundTimeout)
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        StreamIo(e.kind())
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTooLong => write!(f, "Malformed request: line exceeds buffer size"),
            UnterminatedLine => write!(f, "Malformed request: unterminated line"),
            MissingRequestLine => write!(f, "Malformed request: no GET request line"),
            DuplicateRequestLine => write!(f, "Malformed request: more than one request line"),
            MissingSchemeSeparator => write!(f, "Malformed request: URL lacks '//'"),
            EmptyHost => write!(f, "Malformed request: empty host"),
            InvalidPort => write!(f, "Malformed request: invalid port"),
            MissingHttpVersion => write!(f, "Malformed request: missing HTTP/1.x version"),
            RequestIsNotUtf8 => write!(f, "Request line can't be parsed in UTF-8"),
            OutboundConnectFailed => write!(f, "Couldn't connect to origin server"),
            OutboundTimeout => write!(f, "Origin server timed out"),
            StreamIo(kind) => write!(f, "Stream I/O error: {}", kind),
            ObjectTooLarge => write!(f, "Response exceeds maximum object size"),
            ConfigUnreadable => write!(f, "Couldn't read config file"),
            ConfigInvalid => write!(f, "Invalid config file"),
        }
    }
}
