//! 内嵌的配网页面
//!
//! `espconnect.html` 改动后需要重新生成同目录下的 `.gz` 文件。

/// gzip 压缩后的默认页面
pub const PORTAL_PAGE_GZ: &[u8] = include_bytes!("espconnect.html.gz");

/// 配网页面资源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortalPage {
    pub body: &'static [u8],
    /// 为 true 时响应带 `Content-Encoding: gzip`
    pub gzipped: bool,
}

impl Default for PortalPage {
    fn default() -> Self {
        Self {
            body: PORTAL_PAGE_GZ,
            gzipped: true,
        }
    }
}
