//! Shared application state threaded through every handler via axum's
//! `State` extractor.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::attachments::AttachmentStore;
use crate::auth::AuthGate;
use crate::bundle::BundleService;
use crate::sync::SyncEngine;
use crate::users::UserStore;

#[derive(Clone)]
pub struct AppState {
    pub sync: SyncEngine,
    pub attachments: AttachmentStore,
    pub bundle: Arc<BundleService>,
    pub auth: AuthGate,
    pub users: UserStore,
    pub started_at: Arc<OffsetDateTime>,
}
