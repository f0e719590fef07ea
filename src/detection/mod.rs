/// Service identification
///
/// Two layers: a lightweight banner grab with per-service elicitors and an
/// ordered pattern table, and protocol-specific fingerprint probes for the
/// services worth a deeper look (TLS, HTTP, SSH, MySQL).

pub mod banner;
pub mod fingerprint;

pub use banner::{analyze_banner, BannerAnalysis, BannerGrabber, ServiceBanner};
pub use fingerprint::{
    Fingerprint, Fingerprinter, HttpInfo, MysqlInfo, SshInfo, TlsInfo,
};
