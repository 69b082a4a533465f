use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use handlebars::{Handlebars, handlebars_helper};
use serde::Serialize;
use serde_json::json;

use crate::error::{PortalError, Result};

handlebars_helper!(urlencode: |value: str| urlencoding::encode(value).into_owned());

const PARTIALS: [(&str, &str); 2] = [
    ("header", include_str!("./static/header.hbs")),
    ("footer", include_str!("./static/footer.hbs")),
];

const PAGES: [(&str, &str); 7] = [
    ("login", include_str!("./static/login.hbs")),
    ("submit", include_str!("./static/submit.hbs")),
    ("receipt", include_str!("./static/receipt.hbs")),
    ("admin", include_str!("./static/admin.hbs")),
    ("files", include_str!("./static/files.hbs")),
    ("catalog", include_str!("./static/catalog.hbs")),
    ("notice", include_str!("./static/notice.hbs")),
];

pub struct Renderer {
    registry: Handlebars<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.register_helper("urlencode", Box::new(urlencode));

        for (name, source) in PARTIALS {
            registry
                .register_partial(name, source)
                .map_err(|e| PortalError::Template(format!("{name}: {e}")))?;
        }
        for (name, source) in PAGES {
            registry
                .register_template_string(name, source)
                .map_err(|e| PortalError::Template(format!("{name}: {e}")))?;
        }

        Ok(Renderer { registry })
    }

    pub fn render<T: Serialize>(&self, page: &str, data: &T) -> Result<String> {
        self.registry
            .render(page, data)
            .map_err(|e| PortalError::Template(format!("{page}: {e}")))
    }

    /// Render `page` as a response with `status`.
    pub fn page<T: Serialize>(&self, page: &str, data: &T, status: StatusCode) -> Response {
        match self.render(page, data) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => e.into_response(),
        }
    }

    pub fn login(&self, error: Option<&str>, status: StatusCode) -> Response {
        self.page("login", &json!({ "error": error }), status)
    }

    /// A one-message page with a link back.
    pub fn notice(
        &self,
        user: Option<&str>,
        title: &str,
        message: &str,
        back: &str,
        status: StatusCode,
    ) -> Response {
        let data = json!({
            "user": user,
            "title": title,
            "message": message,
            "back": back,
            "is_error": status.is_client_error() || status.is_server_error(),
        });
        self.page("notice", &data, status)
    }
}
