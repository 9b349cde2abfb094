use std::sync::Arc;

use memos_runtime::ConversationRuntime;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ConversationRuntime>,
}
