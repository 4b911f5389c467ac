use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::config::Args;
use crate::error::EdgeError;

/// Static identity fields added to every `/me` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
    pub stack: String,
}

#[derive(Clone, Debug)]
pub struct AppState {
    pub http: reqwest::Client,
    pub fact_url: Arc<str>,
    pub user: Arc<UserInfo>,
}

impl AppState {
    pub fn from_args(args: &Args) -> Result<Self, EdgeError> {
        let http = reqwest::Client::builder()
            .timeout(args.upstream_timeout)
            .build()?;
        Ok(Self {
            http,
            fact_url: args.cat_fact_url.as_str().into(),
            user: Arc::new(UserInfo {
                email: args.email.clone(),
                name: args.name.clone(),
                stack: args.stack.clone(),
            }),
        })
    }
}
