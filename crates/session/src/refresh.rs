//! Single-flight access token refresh
//!
//! Concurrent callers that hit an expired access token all funnel into one
//! refresh call. The first caller spawns the refresh task and records it in
//! the in-flight slot; everyone arriving while it runs awaits the same shared
//! result. The slot is emptied by the task itself as it settles, after the new
//! tokens are persisted and before any waiter observes the result.

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::constants::{DEFAULT_MAX_REFRESH_ATTEMPTS, REFRESH_PATH, REFRESH_TOKEN_HEADER};
use crate::storage::{ensure_device_id, CredentialStore};
use crate::tokens::{extract_token_pair, local_time_zone, RefreshRequest};

type RefreshResult = Option<String>;
type InFlightRefresh = Shared<BoxFuture<'static, RefreshResult>>;
type InFlightSlot = Arc<Mutex<Option<InFlightRefresh>>>;

/// Everything one refresh run needs, detached from the coordinator so the
/// run can outlive the caller that started it.
#[derive(Clone)]
struct RefreshContext {
    http: reqwest::Client,
    endpoint: String,
    store: Arc<dyn CredentialStore>,
    max_attempts: u32,
    time_zone: String,
}

/// Exchanges the stored refresh token for a new token pair, at most one
/// exchange at a time.
pub struct RefreshCoordinator {
    context: RefreshContext,
    in_flight: InFlightSlot,
}

impl RefreshCoordinator {
    /// Creates a coordinator refreshing against `{base_url}/api/v1/auth/refresh`
    pub fn new(http: reqwest::Client, base_url: &str, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            context: RefreshContext {
                http,
                endpoint: format!("{}{}", base_url.trim_end_matches('/'), REFRESH_PATH),
                store,
                max_attempts: DEFAULT_MAX_REFRESH_ATTEMPTS,
                time_zone: local_time_zone(),
            },
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the attempt budget; values below 1 are raised to 1
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.context.max_attempts = max_attempts.max(1);
        self
    }

    /// Overrides the time zone reported to the refresh endpoint
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.context.time_zone = time_zone.into();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.context.endpoint
    }

    /// True while a refresh is running
    pub fn is_refreshing(&self) -> bool {
        self.lock_slot().is_some()
    }

    /// Obtains a new access token, joining the in-flight refresh if there is
    /// one. Resolves `None` when no token could be obtained; never fails.
    pub async fn refresh(&self) -> Option<String> {
        let pending = {
            // No await while the slot is locked: check and set are one step.
            let mut slot = self.lock_slot();
            match slot.as_ref() {
                Some(existing) => {
                    debug!("Joining in-flight token refresh");
                    existing.clone()
                }
                None => {
                    let shared = self.spawn_refresh();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        pending.await
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<InFlightRefresh>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spawn_refresh(&self) -> InFlightRefresh {
        let context = self.context.clone();
        let slot = self.in_flight.clone();

        let task = tokio::spawn(async move {
            let _settle = ClearOnSettle(slot);
            context.run().await
        });

        async move {
            match task.await {
                Ok(token) => token,
                Err(e) => {
                    error!("Token refresh task failed: {}", e);
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Empties the in-flight slot when the refresh task finishes, including when
/// it unwinds.
struct ClearOnSettle(InFlightSlot);

impl Drop for ClearOnSettle {
    fn drop(&mut self) {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

/// Outcome of a single refresh attempt
enum Attempt {
    Refreshed(String),
    /// Worth another attempt
    Retry,
    /// Stop trying and report failure
    GiveUp,
}

impl RefreshContext {
    async fn run(&self) -> RefreshResult {
        let Some(refresh_token) = self.store.refresh_token() else {
            debug!("No refresh token stored, skipping refresh");
            return None;
        };
        let device_id = ensure_device_id(self.store.as_ref());

        for attempt in 1..=self.max_attempts {
            match self.attempt(&refresh_token, &device_id).await {
                Attempt::Refreshed(access_token) => {
                    info!("Access token refreshed (attempt {}/{})", attempt, self.max_attempts);
                    return Some(access_token);
                }
                Attempt::Retry => {
                    debug!("Refresh attempt {}/{} failed", attempt, self.max_attempts);
                }
                Attempt::GiveUp => return None,
            }
        }

        warn!("Token refresh gave up after {} attempts", self.max_attempts);
        None
    }

    async fn attempt(&self, refresh_token: &str, device_id: &str) -> Attempt {
        let response = match self
            .http
            .post(&self.endpoint)
            .header(REFRESH_TOKEN_HEADER, refresh_token)
            .json(&RefreshRequest {
                device_token: device_id,
                time_zone: &self.time_zone,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Token refresh request failed: {}", e);
                return Attempt::GiveUp;
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("Refresh token rejected by server");
            return Attempt::GiveUp;
        }
        if !status.is_success() {
            debug!("Refresh endpoint answered {}", status);
            return Attempt::Retry;
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Unreadable token refresh response: {}", e);
                return Attempt::GiveUp;
            }
        };

        match extract_token_pair(&body) {
            Some(pair) => {
                self.store
                    .set_tokens(&pair.access_token, pair.refresh_token.as_deref());
                Attempt::Refreshed(pair.access_token)
            }
            None => {
                debug!("Refresh response did not contain an access token");
                Attempt::Retry
            }
        }
    }
}
