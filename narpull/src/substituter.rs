//! Substituter transport: ordered narinfo lookup over HTTP.

use std::time::Duration;

use tracing::debug;
use url::Url;

/// Covers headers and body of one narinfo request.
const NARINFO_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A narinfo document plus the substituter that served it. The NAR for
/// this path must be fetched from the same substituter.
#[derive(Debug, Clone)]
pub struct FetchedNarInfo {
    pub text: String,
    pub substituter: Url,
}

impl FetchedNarInfo {
    /// Absolute URL of the NAR, from the narinfo's relative `URL` field.
    pub fn nar_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.substituter.as_str().trim_end_matches('/'),
            relative
        )
    }
}

/// Where the resolver gets narinfo documents from.
///
/// The BFS only cares about "give me the narinfo for this hash part, or
/// tell me nobody has it"; the ordered-fallback HTTP transport lives
/// behind this seam, and tests substitute an in-memory map.
pub trait NarInfoSource {
    fn fetch_narinfo(
        &self,
        hash_part: &str,
    ) -> impl std::future::Future<Output = Option<FetchedNarInfo>> + Send;
}

/// The real transport: tries each substituter in configured order and
/// takes the first 200 response. Transport errors and non-200 statuses
/// just move on to the next substituter.
pub struct HttpSubstituters {
    substituters: Vec<Url>,
    client: reqwest::Client,
}

impl HttpSubstituters {
    pub fn new(substituters: Vec<Url>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(NARINFO_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            substituters,
            client,
        })
    }
}

fn narinfo_url(substituter: &Url, hash_part: &str) -> String {
    format!(
        "{}/{hash_part}.narinfo",
        substituter.as_str().trim_end_matches('/')
    )
}

impl NarInfoSource for HttpSubstituters {
    async fn fetch_narinfo(&self, hash_part: &str) -> Option<FetchedNarInfo> {
        for substituter in &self.substituters {
            let url = narinfo_url(substituter, hash_part);
            let resp = match self.client.get(&url).send().await {
                Ok(resp) => resp,
                Err(err) => {
                    debug!(%url, %err, "substituter request failed, trying next");
                    continue;
                }
            };
            if resp.status() != reqwest::StatusCode::OK {
                debug!(%url, status = %resp.status(), "substituter miss, trying next");
                continue;
            }
            match resp.text().await {
                Ok(text) => {
                    return Some(FetchedNarInfo {
                        text,
                        substituter: substituter.clone(),
                    });
                }
                Err(err) => {
                    debug!(%url, %err, "failed to read narinfo body, trying next");
                    continue;
                }
            }
        }
        None
    }
}
