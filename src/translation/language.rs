//! 语言代码工具
//!
//! 语言代码规范化、基础代码比较、显示名称以及离线模型目录。
//! 所有函数都接受任意字符串，未知或无效代码只会得到"不支持"的结果，不会报错。

/// 未知源语言时使用的缓存分桶标记
pub const AUTO: &str = "auto";

/// 检测器返回的"无法确定"标记
pub const UNDETERMINED: &str = "und";

/// 目录外语言的估计模型大小（MiB）
pub const ESTIMATED_MODEL_SIZE_MB: u64 = 25;

/// 目录条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub code: &'static str,
    pub name: &'static str,
    /// 近似模型大小（MiB）
    pub size_mb: u64,
}

impl CatalogEntry {
    pub fn size_bytes(&self) -> u64 {
        self.size_mb * 1024 * 1024
    }
}

const fn entry(code: &'static str, name: &'static str, size_mb: u64) -> CatalogEntry {
    CatalogEntry {
        code,
        name,
        size_mb,
    }
}

/// 支持离线翻译的全部语言
pub const MODEL_CATALOG: &[CatalogEntry] = &[
    entry("en", "English", 25),
    entry("es", "Spanish", 28),
    entry("fr", "French", 27),
    entry("de", "German", 30),
    entry("it", "Italian", 26),
    entry("pt", "Portuguese", 27),
    entry("ru", "Russian", 32),
    entry("ja", "Japanese", 35),
    entry("ko", "Korean", 33),
    entry("zh", "Chinese", 38),
    entry("th", "Thai", 31),
    entry("vi", "Vietnamese", 28),
    entry("id", "Indonesian", 25),
    entry("ar", "Arabic", 30),
    entry("hi", "Hindi", 29),
    entry("he", "Hebrew", 26),
    entry("fa", "Persian", 28),
    entry("ur", "Urdu", 27),
    entry("nl", "Dutch", 25),
    entry("sv", "Swedish", 24),
    entry("fi", "Finnish", 26),
    entry("da", "Danish", 23),
    entry("no", "Norwegian", 24),
    entry("pl", "Polish", 28),
    entry("tr", "Turkish", 27),
    entry("el", "Greek", 26),
    entry("cs", "Czech", 25),
    entry("hu", "Hungarian", 26),
    entry("ro", "Romanian", 25),
    entry("bg", "Bulgarian", 25),
    entry("hr", "Croatian", 24),
    entry("sk", "Slovak", 24),
    entry("sl", "Slovenian", 23),
    entry("et", "Estonian", 22),
    entry("lv", "Latvian", 22),
    entry("lt", "Lithuanian", 23),
    entry("uk", "Ukrainian", 27),
    // 以下语言没有公布的模型大小
    entry("ms", "Malay", ESTIMATED_MODEL_SIZE_MB),
    entry("bn", "Bengali", ESTIMATED_MODEL_SIZE_MB),
    entry("gu", "Gujarati", ESTIMATED_MODEL_SIZE_MB),
    entry("kn", "Kannada", ESTIMATED_MODEL_SIZE_MB),
    entry("ml", "Malayalam", ESTIMATED_MODEL_SIZE_MB),
    entry("mr", "Marathi", ESTIMATED_MODEL_SIZE_MB),
    entry("pa", "Punjabi", ESTIMATED_MODEL_SIZE_MB),
    entry("ta", "Tamil", ESTIMATED_MODEL_SIZE_MB),
    entry("te", "Telugu", ESTIMATED_MODEL_SIZE_MB),
    entry("af", "Afrikaans", ESTIMATED_MODEL_SIZE_MB),
    entry("sw", "Swahili", ESTIMATED_MODEL_SIZE_MB),
    entry("eu", "Basque", ESTIMATED_MODEL_SIZE_MB),
    entry("be", "Belarusian", ESTIMATED_MODEL_SIZE_MB),
    entry("ca", "Catalan", ESTIMATED_MODEL_SIZE_MB),
    entry("eo", "Esperanto", ESTIMATED_MODEL_SIZE_MB),
    entry("gl", "Galician", ESTIMATED_MODEL_SIZE_MB),
    entry("ga", "Irish", ESTIMATED_MODEL_SIZE_MB),
    entry("is", "Icelandic", ESTIMATED_MODEL_SIZE_MB),
    entry("mt", "Maltese", ESTIMATED_MODEL_SIZE_MB),
    entry("cy", "Welsh", ESTIMATED_MODEL_SIZE_MB),
];

/// 规范化语言代码：去空白、小写、`_` 统一为 `-`
///
/// 空代码返回 `None`。
pub fn normalize(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        return None;
    }
    Some(code.to_lowercase().replace('_', "-"))
}

/// 基础语言代码（`en-US` -> `en`）
pub fn base_code(code: &str) -> Option<String> {
    let normalized = normalize(code)?;
    let base = normalized.split('-').next().unwrap_or_default();
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// 按基础代码比较两个语言是否相同
pub fn same_language(a: &str, b: &str) -> bool {
    match (base_code(a), base_code(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// 映射到离线模型使用的语言代码
///
/// `zh-CN`、`zh-TW` 等地区变体映射为 `zh`，不支持的代码返回 `None`。
pub fn on_device_code(code: &str) -> Option<&'static str> {
    let base = base_code(code)?;
    catalog_entry(&base).map(|entry| entry.code)
}

/// 是否支持离线翻译
pub fn is_supported(code: &str) -> bool {
    on_device_code(code).is_some()
}

/// 查找目录条目（需要基础代码）
pub fn catalog_entry(code: &str) -> Option<&'static CatalogEntry> {
    MODEL_CATALOG.iter().find(|entry| entry.code == code)
}

/// 语言显示名称
///
/// 未知代码原样返回，空代码返回 `Unknown`。
pub fn display_name(code: &str) -> String {
    match base_code(code) {
        Some(base) => catalog_entry(&base)
            .map(|entry| entry.name.to_string())
            .unwrap_or_else(|| code.trim().to_string()),
        None => "Unknown".to_string(),
    }
}

/// 格式化文件大小（B / KB / MB）
pub fn format_size(size_bytes: u64) -> String {
    if size_bytes < 1024 {
        format!("{} B", size_bytes)
    } else if size_bytes < 1024 * 1024 {
        format!("{:.1} KB", size_bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", size_bytes as f64 / (1024.0 * 1024.0))
    }
}
