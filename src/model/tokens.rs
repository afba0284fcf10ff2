use rand::Rng;

/// 替换为每次执行生成的随机整数
pub const RANDOM_VALUE: &str = "RANDOM_VALUE";

/// 替换为每次执行的时间戳（毫秒）
pub const SYSTEM_TIME: &str = "SYSTEM_TIME";

/// 期望值中出现时，该位置可匹配任意子串
pub const IGNORE_VALUE: &str = "IGNORE_VALUE";

/// 期望值中出现时，整个值视为相等
pub const IGNORE_STRING: &str = "IGNORE_STRING";

/// 请求体前缀：文件上传
pub const UPLOAD_REQUEST: &str = "UPLOAD_REQUEST";

/// 请求体前缀：文件下载
pub const DOWNLOAD_REQUEST: &str = "DOWNLOAD_REQUEST";

/// 变量值前缀：XPath 提取
pub const XPATH_PREFIX: &str = "XPATH:";

/// 变量值前缀：JSONPath 提取
pub const JSON_PATH_PREFIX: &str = "$";

/// 一次 Call 执行中共享的保留 token 值
///
/// URL、请求体和常量变量使用同一组值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTokens {
    pub random: u32,
    pub timestamp: i64,
}

impl AttemptTokens {
    pub fn generate() -> Self {
        Self {
            random: rand::rng().random_range(0..=i32::MAX as u32),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn fixed(random: u32, timestamp: i64) -> Self {
        Self { random, timestamp }
    }

    /// 替换 RANDOM_VALUE 与 SYSTEM_TIME
    pub fn apply(&self, text: &str) -> String {
        text.replace(RANDOM_VALUE, &self.random.to_string())
            .replace(SYSTEM_TIME, &self.timestamp.to_string())
    }
}
