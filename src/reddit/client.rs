use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::models::{into_nodes, MoreChildrenResponse, Thing, TokenResponse};
use super::{ApiError, CommentForest, CommentNode, Page, RedditApi, TimeWindow};
use crate::config::{Config, Credentials};

/// Refresh the token this long before Reddit says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Largest `limit` the comments endpoint honours.
const COMMENT_PAGE_LIMIT: usize = 500;

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Application-only OAuth client for Reddit's JSON API.
pub struct RedditClient {
    http: reqwest::Client,
    credentials: Credentials,
    api_url: String,
    auth_url: String,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// Build a client for the endpoints and credentials in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        Self::with_endpoints(config.credentials.clone(), &config.api_url, &config.auth_url)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoints(
        credentials: Credentials,
        api_url: &str,
        auth_url: &str,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            http,
            credentials,
            api_url: api_url.trim_end_matches('/').to_string(),
            auth_url: auth_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        })
    }

    /// Obtain an access token now, so bad credentials fail before any work.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Auth`] if Reddit rejects the credentials.
    pub async fn authenticate(&self) -> Result<(), ApiError> {
        self.bearer().await.map(|_| ())
    }

    async fn bearer(&self) -> Result<String, ApiError> {
        let mut token = self.token.lock().await;
        if let Some(current) = token.as_ref() {
            if Instant::now() < current.expires_at {
                return Ok(current.value.clone());
            }
            debug!("Access token expired, requesting a new one");
        }

        let fresh = self.request_token().await?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    async fn request_token(&self) -> Result<AccessToken, ApiError> {
        let url = format!("{}/api/v1/access_token", self.auth_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(ApiError::Network)?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(ApiError::Auth(format!(
                "token request returned status {}",
                response.status()
            )));
        }
        let body: TokenResponse = decode(&url, check_status(&url, response)?).await?;

        if let Some(error) = body.error {
            return Err(ApiError::Auth(error));
        }
        let Some(value) = body.access_token else {
            return Err(ApiError::Auth("no access token in response".to_string()));
        };
        let lifetime = Duration::from_secs(body.expires_in.unwrap_or(3600));

        debug!(expires_in = lifetime.as_secs(), "Obtained access token");
        Ok(AccessToken {
            value,
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ApiError> {
        let url = format!("{}/{}", self.api_url, path.trim_start_matches('/'));
        let bearer = self.bearer().await?;

        trace!(url = %url, "GET");
        let response = self
            .http
            .get(&url)
            .bearer_auth(bearer)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .await
            .map_err(ApiError::Network)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Let the next call fetch a fresh token.
            *self.token.lock().await = None;
        }

        decode(&url, check_status(&url, response)?).await
    }

    async fn comment_listing(
        &self,
        submission_id: &str,
        focus: Option<&str>,
    ) -> Result<Vec<CommentNode>, ApiError> {
        let path = format!("comments/{submission_id}");
        let limit = COMMENT_PAGE_LIMIT.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(comment_id) = focus {
            query.push(("comment", comment_id));
        }

        let things: Vec<Thing> = self.get_json(&path, &query).await?;
        match things.into_iter().nth(1) {
            Some(Thing::Listing(listing)) => Ok(listing.into_nodes()),
            _ => Err(ApiError::Decode {
                url: path,
                message: "expected a comment listing as the second element".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RedditApi for RedditClient {
    async fn top_page(
        &self,
        subreddit: &str,
        window: TimeWindow,
        after: Option<&str>,
        page_size: usize,
    ) -> Result<Page, ApiError> {
        let path = format!("r/{subreddit}/top");
        let limit = page_size.to_string();
        let mut query = vec![("t", window.as_str()), ("limit", limit.as_str())];
        if let Some(after) = after {
            query.push(("after", after));
        }

        match self.get_json::<Thing>(&path, &query).await? {
            Thing::Listing(listing) => {
                let after = listing.after.clone();
                Ok(Page {
                    submissions: listing.into_submissions(),
                    after,
                })
            }
            _ => Err(ApiError::Decode {
                url: path,
                message: "expected a listing".to_string(),
            }),
        }
    }

    async fn comment_tree(&self, submission_id: &str) -> Result<CommentForest, ApiError> {
        let nodes = self.comment_listing(submission_id, None).await?;
        Ok(CommentForest::from_nodes(submission_id, nodes))
    }

    async fn more_children(
        &self,
        submission_id: &str,
        children: &[String],
    ) -> Result<Vec<CommentNode>, ApiError> {
        let link_id = format!("t3_{submission_id}");
        let children = children.join(",");
        let query = [
            ("api_type", "json"),
            ("link_id", link_id.as_str()),
            ("children", children.as_str()),
        ];

        let response: MoreChildrenResponse = self.get_json("api/morechildren", &query).await?;
        if !response.json.errors.is_empty() {
            return Err(ApiError::Decode {
                url: "api/morechildren".to_string(),
                message: serde_json::Value::Array(response.json.errors).to_string(),
            });
        }
        Ok(response
            .json
            .data
            .map(|data| into_nodes(data.things))
            .unwrap_or_default())
    }

    async fn comment_thread(
        &self,
        submission_id: &str,
        comment_id: &str,
    ) -> Result<Vec<CommentNode>, ApiError> {
        self.comment_listing(submission_id, Some(comment_id)).await
    }
}

fn check_status(url: &str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ApiError::Auth(format!("{url} returned status {status}"))),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .or_else(|| response.headers().get("x-ratelimit-reset"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|secs| secs.ceil() as u64);
            Err(ApiError::RateLimited { retry_after })
        }
        _ => Err(ApiError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ApiError> {
    let body = response.text().await.map_err(ApiError::Network)?;
    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}
