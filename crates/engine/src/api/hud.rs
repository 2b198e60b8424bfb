//! Web HUD routes: launch-token handoff and the interface fragment.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use rphud_domain::{CharacterSummary, Player};

use super::error::ApiError;
use crate::app::App;
use crate::infrastructure::session::{session_id_from_cookie_header, RequestContext};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

fn is_https(app: &App, headers: &HeaderMap) -> bool {
    app.config.force_https
        || headers
            .get(FORWARDED_PROTO)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("https"))
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(session_id_from_cookie_header)
}

/// `GET /hud/launch?token=…`
pub async fn launch(
    State(app): State<Arc<App>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let mut ctx = RequestContext::new(query, session_id(&headers), is_https(&app, &headers));
    if let Some(id) = &ctx.session_id {
        if let Some(data) = app.sessions.load(id).await {
            ctx.session = data;
        }
    }

    let mut db = app.database();
    let mut response = match app.use_cases.handoff.execute(&mut db, &mut ctx).await {
        Ok(outcome) => match HeaderValue::from_str(&outcome.redirect_to) {
            Ok(location) => (StatusCode::SEE_OTHER, [(LOCATION, location)]).into_response(),
            Err(e) => ApiError::Internal(format!("invalid redirect target: {e}")).into_response(),
        },
        Err(e) => ApiError::from(e).into_response(),
    };

    ctx.response.commit();
    for cookie in ctx.response.cookies() {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping unencodable Set-Cookie value"),
        }
    }
    response
}

/// `GET` on the configured interface path.
pub async fn interface(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let stored = match session_id(&headers) {
        Some(id) => app.sessions.load(&id).await,
        None => None,
    };
    let Some(stored) = stored else {
        return Ok((StatusCode::FORBIDDEN, Html(EXPIRED_FRAGMENT)).into_response());
    };

    let mut db = app.database();
    let Some(player) = app.use_cases.verify_session.execute(&mut db, &stored).await? else {
        return Ok((StatusCode::FORBIDDEN, Html(EXPIRED_FRAGMENT)).into_response());
    };
    let characters = app.use_cases.character.list.execute(&mut db, &player).await?;

    Ok(Html(render_interface(&player, &characters)).into_response())
}

const EXPIRED_FRAGMENT: &str =
    "<div class=\"rphud rphud-expired\"><p>Your HUD session has expired. \
     Touch your HUD to open it again.</p></div>";

fn render_interface(player: &Player, characters: &[CharacterSummary]) -> String {
    let mut html = String::from("<div class=\"rphud\">");
    let _ = write!(html, "<h1>{}</h1><ul class=\"characters\">", escape_html(&player.player_name));
    for character in characters {
        let current = player.player_current_character == Some(character.character_id);
        let _ = write!(
            html,
            "<li data-id=\"{}\"{}>{}</li>",
            character.character_id,
            if current { " class=\"current\"" } else { "" },
            escape_html(&character.character_name)
        );
    }
    html.push_str("</ul></div>");
    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
