//! In-world command dispatch.
//!
//! `/api?module=…&cmd=…` selects one entry of a closed command table. Every
//! request first bootstraps the calling avatar as a player, then runs the
//! command with that player.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rphud_domain::{CharacterRef, DialogMenu, MenuOption, Player, TemplateKind};
use serde_json::json;

use super::auth::Identity;
use super::error::ApiError;
use crate::app::App;
use crate::infrastructure::database::Database;

type Params = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    User,
    Character,
    Hud,
    Menu,
}

const MODULES: &[(&str, Module)] = &[
    ("user", Module::User),
    ("character", Module::Character),
    ("hud", Module::Hud),
    ("menu", Module::Menu),
];

impl FromStr for Module {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MODULES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, module)| *module)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown module: {s}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    UserCheck,
    UserInfo,
    CharacterCreate,
    CharacterLoad,
    CharacterList,
    CharacterSelect,
    CharacterUpdate,
    CharacterImport,
    HudRegister,
    MenuCharacters,
    MenuResolve,
}

const COMMANDS: &[(Module, &str, Command)] = &[
    (Module::User, "check", Command::UserCheck),
    (Module::User, "info", Command::UserInfo),
    (Module::Character, "create", Command::CharacterCreate),
    (Module::Character, "load", Command::CharacterLoad),
    (Module::Character, "list", Command::CharacterList),
    (Module::Character, "select", Command::CharacterSelect),
    (Module::Character, "update", Command::CharacterUpdate),
    (Module::Character, "import", Command::CharacterImport),
    (Module::Hud, "register", Command::HudRegister),
    (Module::Menu, "characters", Command::MenuCharacters),
    (Module::Menu, "resolve", Command::MenuResolve),
];

/// Action prefix of the character menu entries.
pub const SELECT_ACTION_PREFIX: &str = "character:select:";

impl Command {
    pub fn lookup(module: Module, name: &str) -> Result<Self, ApiError> {
        let name = name.trim();
        COMMANDS
            .iter()
            .find(|(m, n, _)| *m == module && n.eq_ignore_ascii_case(name))
            .map(|(_, _, command)| *command)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown command: {name}")))
    }

    async fn run(
        self,
        app: &App,
        db: &mut Database,
        player: &Player,
        params: &Params,
    ) -> Result<Response, ApiError> {
        let characters = &app.use_cases.character;
        match self {
            Command::UserCheck => Ok("OK".into_response()),
            Command::UserInfo => Ok(Json(player).into_response()),

            Command::CharacterCreate => {
                let view = characters
                    .create
                    .execute(db, player, required(params, "name")?)
                    .await?;
                Ok(Json(view).into_response())
            }
            Command::CharacterLoad => {
                let character = character_or_current(params, player)?;
                let view = characters.load.execute(db, player, character).await?;
                Ok(Json(view).into_response())
            }
            Command::CharacterList => {
                let summaries = characters.list.execute(db, player).await?;
                Ok(Json(summaries).into_response())
            }
            Command::CharacterSelect => {
                let character = character_ref(required(params, "id")?)?;
                let selected = characters.select.execute(db, player, character).await?;
                Ok(Json(json!({
                    "character": selected.view,
                    "titler_notified": selected.titler_notified,
                }))
                .into_response())
            }
            Command::CharacterUpdate => {
                let character = character_or_current(params, player)?;
                let template = required(params, "template")?;
                let kind = TemplateKind::parse(template)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown template: {template}")))?;
                let value = params
                    .get("value")
                    .ok_or_else(|| ApiError::BadRequest("missing value".to_string()))?;
                let view = characters
                    .update
                    .execute(db, player, character, kind, required(params, "field")?, value)
                    .await?;
                Ok(Json(view).into_response())
            }
            Command::CharacterImport => {
                let report = characters.import.import_for(db, player).await?;
                Ok(Json(report).into_response())
            }

            Command::HudRegister => {
                let registration = app
                    .use_cases
                    .hud
                    .execute(
                        db,
                        player,
                        optional(params, "titler_url"),
                        optional(params, "hud_url"),
                    )
                    .await?;
                Ok(Json(json!({ "verified": registration.verified })).into_response())
            }

            Command::MenuCharacters => {
                let menu = character_menu(app, db, player, page(params)?).await?;
                Ok(Json(json!({
                    "page": menu.page,
                    "total_pages": menu.total_pages,
                    "has_prev": menu.has_prev(),
                    "has_next": menu.has_next(),
                    "buttons": menu.remote_buttons(),
                }))
                .into_response())
            }
            Command::MenuResolve => {
                let menu = character_menu(app, db, player, page(params)?).await?;
                let reply = required(params, "reply")?;
                let action = menu
                    .resolve(reply)
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown reply: {reply}")))?;
                Ok(action.to_string().into_response())
            }
        }
    }
}

async fn character_menu(
    app: &App,
    db: &mut Database,
    player: &Player,
    page: usize,
) -> Result<DialogMenu, ApiError> {
    let summaries = app.use_cases.character.list.execute(db, player).await?;
    let options: Vec<MenuOption> = summaries
        .iter()
        .map(|s| {
            MenuOption::new(
                s.character_name.as_str(),
                format!("{SELECT_ACTION_PREFIX}{}", s.character_id),
            )
        })
        .collect();
    Ok(DialogMenu::build(&options, page, true))
}

fn optional<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn required<'a>(params: &'a Params, key: &str) -> Result<&'a str, ApiError> {
    optional(params, key).ok_or_else(|| ApiError::BadRequest(format!("missing {key}")))
}

fn character_ref(raw: &str) -> Result<CharacterRef, ApiError> {
    raw.parse()
        .map_err(|e: rphud_domain::DomainError| ApiError::BadRequest(e.to_string()))
}

/// `id` when given, else the player's current character.
fn character_or_current(params: &Params, player: &Player) -> Result<CharacterRef, ApiError> {
    match optional(params, "id") {
        Some(raw) => character_ref(raw),
        None => player
            .player_current_character
            .map(CharacterRef::Current)
            .ok_or(ApiError::NotFound),
    }
}

fn page(params: &Params) -> Result<usize, ApiError> {
    optional(params, "page")
        .map(|raw| {
            raw.parse()
                .map_err(|_| ApiError::BadRequest(format!("invalid page: {raw}")))
        })
        .transpose()
        .map(Option::unwrap_or_default)
}

/// `GET|POST /api` handler.
pub async fn dispatch(
    State(app): State<Arc<App>>,
    Identity(identity): Identity,
    Query(mut params): Query<Params>,
    form: Result<Form<Params>, FormRejection>,
) -> Result<Response, ApiError> {
    if let Ok(Form(body)) = form {
        params.extend(body);
    }

    let module: Module = required(&params, "module")?.parse()?;
    let name = optional(&params, "cmd")
        .or_else(|| optional(&params, "action"))
        .ok_or_else(|| ApiError::BadRequest("missing cmd".to_string()))?;
    let command = Command::lookup(module, name)?;

    let mut db = app.database();
    let registered = app
        .use_cases
        .identity
        .check_user_exists
        .execute(&mut db, &identity.owner_key, &identity.owner_name)
        .await;
    if !registered {
        return Err(ApiError::Internal("player bootstrap failed".to_string()));
    }
    let player = app
        .use_cases
        .identity
        .load_player
        .by_uuid(&mut db, &identity.owner_key)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::debug!(?module, ?command, player_id = %player.player_id, "Dispatching command");
    command.run(&app, &mut db, &player, &params).await
}
