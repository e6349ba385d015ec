// Failure diagnostics - classifies yt-dlp error output
//
// Analyzes error messages to determine:
// - Why extraction or download failed (host, site, content)
// - Whether anything on the user's side might help
// - A short explanation for permanent restrictions

use serde::{Deserialize, Serialize};

/// Reasons why a site or the network refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// DNS failure, connection refused, no route to host
    HostUnreachable,

    /// No extractor for this site
    UnsupportedSite,

    /// Not something yt-dlp can parse as a URL
    InvalidUrl,

    /// Private content requiring authorization
    PrivateContent,

    /// Deleted, removed or otherwise unavailable
    ContentUnavailable,

    /// DRM-protected or paid content
    DrmProtected,

    /// Channel membership required
    MembersOnly,

    /// Age gate requiring login
    AgeRestricted,

    /// Geographic restriction
    GeoBlocked,

    /// Rate limiting (429 or similar)
    RateLimited,

    /// HTTP 403 Forbidden
    Forbidden,

    /// The chosen format disappeared between resolution and download
    FormatUnavailable,

    /// Network timeout
    Timeout,

    /// Extraction succeeded but nothing downloadable was offered
    NoFormats,

    /// Output from the tool could not be understood
    MalformedOutput,

    Unknown,
}

impl FailureReason {
    /// Check if retrying later with the same settings could work
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HostUnreachable | Self::RateLimited | Self::Timeout | Self::FormatUnavailable
        )
    }

    /// Check if cookies might help
    pub fn cookies_might_help(&self) -> bool {
        matches!(
            self,
            Self::PrivateContent | Self::MembersOnly | Self::AgeRestricted | Self::Forbidden
        )
    }

    /// Check if proxy might help
    pub fn proxy_might_help(&self) -> bool {
        matches!(
            self,
            Self::GeoBlocked | Self::RateLimited | Self::Forbidden | Self::Timeout
        )
    }

    /// Check if this is a permanent restriction (no workaround)
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::ContentUnavailable | Self::UnsupportedSite
        )
    }

    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::HostUnreachable => "Host unreachable",
            Self::UnsupportedSite => "Unsupported site",
            Self::InvalidUrl => "Invalid URL",
            Self::PrivateContent => "Private content",
            Self::ContentUnavailable => "Content unavailable",
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::AgeRestricted => "Age-restricted content",
            Self::GeoBlocked => "Geographic restriction",
            Self::RateLimited => "Rate limited",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::FormatUnavailable => "Requested format is not available",
            Self::Timeout => "Network timeout",
            Self::NoFormats => "No downloadable formats",
            Self::MalformedOutput => "Unreadable extractor output",
            Self::Unknown => "Extraction failed",
        }
    }

    /// Get user-friendly explanation for permanent restrictions
    pub fn user_explanation(&self) -> Option<&'static str> {
        match self {
            Self::DrmProtected => Some(
                "This content is DRM-protected and cannot be downloaded as a file.\n\
                 This is a content protection measure, not an error.",
            ),
            Self::ContentUnavailable => {
                Some("This content has been removed or is no longer available.")
            }
            Self::UnsupportedSite => {
                Some("yt-dlp has no extractor for this site. Updating yt-dlp may add support.")
            }
            _ => None,
        }
    }

    /// Things the user can try, in order
    pub fn suggestions(&self) -> Vec<&'static str> {
        let mut tips = Vec::new();
        match self {
            Self::HostUnreachable => tips.push("Check the URL and your internet connection"),
            Self::InvalidUrl => tips.push("Paste the full address, starting with http:// or https://"),
            Self::FormatUnavailable => tips.push("Fetch the qualities again and pick another one"),
            Self::NoFormats => tips.push("The page may not contain a video; try the direct video page"),
            Self::MalformedOutput | Self::Unknown => tips.push("Update yt-dlp and try again"),
            _ => {}
        }
        if self.cookies_might_help() {
            tips.push("Provide a cookies.txt file from a logged-in browser (--cookies)");
        }
        if self.proxy_might_help() {
            tips.push("Use a proxy or VPN (--proxy)");
        }
        if self.is_transient() && *self != Self::FormatUnavailable {
            tips.push("Wait a moment and try again");
        }
        tips
    }
}

/// Analyze error message and return the failure reason
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    if error.trim().is_empty() {
        return None;
    }

    let lower = error.to_lowercase();

    // Check patterns in order of specificity

    if lower.contains("unsupported url") || lower.contains("no suitable extractor") {
        return Some(FailureReason::UnsupportedSite);
    }

    if lower.contains("is not a valid url")
        || lower.contains("invalid url")
        || lower.contains("no such file or directory: '")
    {
        return Some(FailureReason::InvalidUrl);
    }

    if lower.contains("requested format is not available") {
        return Some(FailureReason::FormatUnavailable);
    }

    // DRM protection (permanent restriction)
    if lower.contains("drm")
        || lower.contains("widevine")
        || lower.contains("playready")
        || lower.contains("fairplay")
        || lower.contains("requires purchase")
        || lower.contains("this video requires payment")
    {
        return Some(FailureReason::DrmProtected);
    }

    if lower.contains("members only")
        || lower.contains("members-only")
        || lower.contains("join this channel")
        || lower.contains("available to members")
    {
        return Some(FailureReason::MembersOnly);
    }

    if lower.contains("age-restricted")
        || lower.contains("sign in to confirm your age")
        || lower.contains("age_verification")
    {
        return Some(FailureReason::AgeRestricted);
    }

    if lower.contains("private video")
        || lower.contains("video is private")
        || lower.contains("this content is private")
        || lower.contains("sign in if you've been granted access")
    {
        return Some(FailureReason::PrivateContent);
    }

    if lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("no longer available")
        || lower.contains("is unavailable")
        || lower.contains("http error 404")
    {
        return Some(FailureReason::ContentUnavailable);
    }

    if lower.contains("not available in your country")
        || lower.contains("blocked in your country")
        || lower.contains("geo restriction")
        || lower.contains("geo-restricted")
    {
        return Some(FailureReason::GeoBlocked);
    }

    if lower.contains("429") || lower.contains("rate limit") || lower.contains("too many requests") {
        return Some(FailureReason::RateLimited);
    }

    if lower.contains("403") || lower.contains("forbidden") {
        return Some(FailureReason::Forbidden);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(FailureReason::Timeout);
    }

    if lower.contains("name or service not known")
        || lower.contains("nodename nor servname")
        || lower.contains("getaddrinfo failed")
        || lower.contains("failed to resolve")
        || lower.contains("temporary failure in name resolution")
        || lower.contains("connection refused")
        || lower.contains("no route to host")
        || lower.contains("network is unreachable")
        || lower.contains("unable to download webpage")
    {
        return Some(FailureReason::HostUnreachable);
    }

    Some(FailureReason::Unknown)
}
