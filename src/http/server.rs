use anyhow::anyhow;
use log::info;
use rouille::{Request, Response};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    auth::{AuthGate, AuthorizationResponse, Session},
    config::{HttpConfig, SessionConfig},
    domain::score::{ScoreId, ScoreInput},
    http::error::ApiError,
    storage::{error::StorageError, operations::ScoreStore},
};

const AFTER_LOGIN_PATH: &str = "/score_after_login";

pub struct HttpServer {
    storage: Arc<Mutex<ScoreStore>>,
    gate: Arc<AuthGate>,
    session: SessionConfig,
    pub config: HttpConfig,
}

/// What the provider sends back to the callback, by query or `form_post`
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackParams {
    fn from_query(request: &Request) -> Self {
        Self {
            code: request.get_param("code"),
            state: request.get_param("state"),
            error: request.get_param("error"),
            error_description: request.get_param("error_description"),
        }
    }

    fn from_form(request: &Request) -> Result<Self, ApiError> {
        let form = rouille::post_input!(request, {
            code: Option<String>,
            state: Option<String>,
            error: Option<String>,
            error_description: Option<String>
        })
        .map_err(|e| ApiError::BadRequest(format!("malformed callback form: {e}")))?;

        Ok(Self {
            code: form.code,
            state: form.state,
            error: form.error,
            error_description: form.error_description,
        })
    }
}

#[derive(Serialize)]
struct SessionResponse<'a> {
    authenticated: bool,
    session: &'a Session,
}

impl HttpServer {
    pub fn new(
        storage: ScoreStore,
        gate: AuthGate,
        config: HttpConfig,
        session: SessionConfig,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            gate: Arc::new(gate),
            session,
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        let mut response = rouille::session::session(
            request,
            &self.session.cookie_name,
            self.session.timeout_secs,
            |session| self.route(request, session.id()),
        );
        self.keep_first_session_cookie(&mut response);

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    /// `rouille::session` appends a cookie for the id the request came with; a
    /// cookie set by the handler (a rotated id) comes first and must win
    fn keep_first_session_cookie(&self, response: &mut Response) {
        let prefix = format!("{}=", self.session.cookie_name);
        let mut seen = false;
        response.headers.retain(|(name, value)| {
            if !name.eq_ignore_ascii_case("Set-Cookie") || !value.starts_with(&prefix) {
                return true;
            }
            let first = !seen;
            seen = true;
            first
        });
    }

    fn session_cookie(&self, sid: &str) -> String {
        format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly",
            self.session.cookie_name, sid, self.session.timeout_secs
        )
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn route(&self, request: &Request, sid: &str) -> Response {
        rouille::router!(request,
            (GET) (/score) => {
                Self::respond(self.list())
            },
            (GET) (/score_list) => {
                Self::respond(self.list())
            },
            (GET) (/score_delete) => {
                self.protected(sid, || self.list())
            },
            (POST) (/score) => {
                self.protected(sid, || self.create(request))
            },
            (POST) (/add_score) => {
                self.protected(sid, || self.create(request))
            },
            (GET) (/scores/{id: i64}) => {
                Self::respond(self.get(ScoreId(id)))
            },
            (POST) (/scores/{id: i64}/update) => {
                self.protected(sid, || self.update(ScoreId(id), request))
            },
            (POST) (/scores/{id: i64}/delete) => {
                self.protected(sid, || self.delete(ScoreId(id)))
            },
            (GET) (/score_search) => {
                let title = request.get_param("title").unwrap_or_default();
                Self::respond(self.search(&title))
            },
            (POST) (/score_search) => {
                Self::respond(Self::search_form(request).and_then(|title| self.search(&title)))
            },
            (GET) (/score_login) => {
                self.handle_login(sid)
            },
            (GET) (/score_callback) => {
                Self::respond(self.callback(CallbackParams::from_query(request), sid))
            },
            (POST) (/score_callback) => {
                Self::respond(
                    CallbackParams::from_form(request).and_then(|params| self.callback(params, sid)),
                )
            },
            (GET) (/score_after_login) => {
                self.handle_after_login(sid)
            },
            (POST) (/score_after_login) => {
                self.handle_after_login(sid)
            },
            (GET) (/score_logout) => {
                Response::redirect_302(self.gate.logout(sid))
            },
            _ => Response::empty_404()
        )
    }

    fn respond(result: Result<Response, ApiError>) -> Response {
        match result {
            Ok(r) => r,
            Err(e) => e.into_response(),
        }
    }

    /// runs `handler` only when `sid` holds an authenticated session
    fn protected<F>(&self, sid: &str, handler: F) -> Response
    where
        F: FnOnce() -> Result<Response, ApiError>,
    {
        Self::respond(
            self.gate
                .require_session(sid)
                .map_err(ApiError::from)
                .and_then(|_| handler()),
        )
    }

    fn store(&self) -> Result<MutexGuard<'_, ScoreStore>, ApiError> {
        self.storage.lock().map_err(|e| {
            StorageError::Internal(anyhow!("Could not access score storage under lock: {e}"))
                .into()
        })
    }

    fn score_input(request: &Request) -> Result<ScoreInput, ApiError> {
        let form = rouille::post_input!(request, {
            number: Option<String>,
            title: Option<String>,
            composer: Option<String>,
            arranger: Option<String>
        })
        .map_err(|e| ApiError::BadRequest(format!("malformed score form: {e}")))?;

        ScoreInput::new(form.number, form.title, form.composer, form.arranger)
            .map_err(|e| StorageError::from(e).into())
    }

    fn search_form(request: &Request) -> Result<String, ApiError> {
        let form = rouille::post_input!(request, { title: Option<String> })
            .map_err(|e| ApiError::BadRequest(format!("malformed search form: {e}")))?;
        Ok(form.title.unwrap_or_default())
    }

    fn list(&self) -> Result<Response, ApiError> {
        let scores = self.store()?.list_all()?;
        Ok(Response::json(&scores))
    }

    fn create(&self, request: &Request) -> Result<Response, ApiError> {
        let input = Self::score_input(request)?;
        let score = self.store()?.create(&input)?;
        info!("score {} created", score.id);
        Ok(Response::json(&score).with_status_code(201))
    }

    fn get(&self, id: ScoreId) -> Result<Response, ApiError> {
        let score = self.store()?.get_by_id(id)?;
        Ok(Response::json(&score))
    }

    fn update(&self, id: ScoreId, request: &Request) -> Result<Response, ApiError> {
        let input = Self::score_input(request)?;
        let score = self.store()?.update_by_id(id, &input)?;
        info!("score {id} updated");
        Ok(Response::json(&score))
    }

    fn delete(&self, id: ScoreId) -> Result<Response, ApiError> {
        self.store()?.delete_by_id(id)?;
        info!("score {id} deleted");
        Ok(Response::empty_204())
    }

    fn search(&self, title: &str) -> Result<Response, ApiError> {
        let scores = self.store()?.search_by_title(title)?;
        Ok(Response::json(&scores))
    }

    fn handle_login(&self, sid: &str) -> Response {
        if self.gate.is_authenticated(sid) {
            return Response::redirect_302(AFTER_LOGIN_PATH);
        }
        Response::redirect_302(self.gate.start_login(sid))
    }

    /// Completes the login and moves it to a fresh session id
    fn callback(&self, params: CallbackParams, sid: &str) -> Result<Response, ApiError> {
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            log::warn!("provider rejected login for session {sid}: {error} {description}");
            return Err(ApiError::Unauthorized(format!(
                "login failed: {error} {description}"
            )));
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) => (code, state),
            _ => return Err(ApiError::BadRequest("missing code or state".into())),
        };

        self.gate
            .complete_login(sid, &AuthorizationResponse { code, state })?;

        let new_sid = rouille::session::generate_session_id();
        if !self.gate.rotate_session(sid, &new_sid) {
            // logged out between the exchange and here
            return Err(ApiError::LoginRequired);
        }
        Ok(Response::redirect_302(AFTER_LOGIN_PATH)
            .with_additional_header("Set-Cookie", self.session_cookie(&new_sid)))
    }

    fn handle_after_login(&self, sid: &str) -> Response {
        match self.gate.current_session(sid) {
            Some(session) => Response::json(&SessionResponse {
                authenticated: true,
                session: &session,
            }),
            None => ApiError::LoginRequired.into_response(),
        }
    }
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
