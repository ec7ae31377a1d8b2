//! 公共工具模块

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// 按字符数截断字符串（硬截断，不追加省略号）
///
/// 返回不超过 `max_chars` 个字符的前缀，不会在多字节字符中间截断
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

/// 对密钥做脱敏显示：保留前缀标识和末尾 4 个字符
///
/// 例如 `lsv2_pt_abcdef1234` -> `lsv2_****1234`
pub fn mask_secret(secret: &str, keep_prefix: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let prefix = if secret.starts_with(keep_prefix) {
        keep_prefix
    } else {
        ""
    };
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= prefix.chars().count() + 4 {
        return format!("{}****", prefix);
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", prefix, tail)
}

/// 后台运行任务（fire-and-forget），捕获 panic 并只记日志
///
/// 不在 tokio 运行时中时丢弃任务
pub fn spawn_isolated<F>(label: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle,
        Err(_) => {
            tracing::warn!("当前不在 tokio 运行时中，跳过后台任务: {}", label);
            return;
        }
    };
    handle.spawn(async move {
        if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
            tracing::error!("后台任务异常（panic），已丢弃: {}", label);
        }
    });
}
