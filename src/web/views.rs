use askama::Template;
use askama_web::WebTemplate;
use axum::extract::State;

use super::AppState;

/// How many catalog tags are offered as keyword hints
const SUGGESTION_COUNT: usize = 12;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) suggestions: Vec<String>,
}

/// handles the / GET
pub(crate) async fn index_handler(State(state): State<AppState>) -> IndexTemplate {
    IndexTemplate {
        suggestions: state.config.catalog.suggestions(SUGGESTION_COUNT),
    }
}
