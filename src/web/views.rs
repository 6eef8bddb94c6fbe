use askama::Template;
use askama_web::WebTemplate;

use crate::history::Session;

#[derive(Clone, Debug)]
pub(crate) struct RecentSession {
    pub(crate) prototype_url: String,
    pub(crate) thumbnail_url: String,
    pub(crate) created: String,
    pub(crate) custom_prompt: String,
    pub(crate) total_cost: String,
    pub(crate) duration: String,
}

impl From<Session> for RecentSession {
    fn from(session: Session) -> Self {
        Self {
            prototype_url: session.prototype_url,
            thumbnail_url: session.thumbnail_url.unwrap_or_default(),
            created: session.timestamp.format("%Y-%m-%d %H:%M UTC").to_string(),
            custom_prompt: session.custom_prompt,
            total_cost: session.costs.total_cost,
            duration: format!("{:.1}", session.duration),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub(crate) struct IndexTemplate {
    pub(crate) model: String,
    pub(crate) max_image_dimension: u32,
    pub(crate) max_upload_mb: usize,
    pub(crate) sessions: Vec<RecentSession>,
}
