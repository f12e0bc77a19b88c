use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tokio::{net::TcpListener, sync::Mutex};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};

use climate_panel_common::{
    protocol::{ROUTE_ACK, ROUTE_FETCH, ROUTE_REPORT},
    ControlState, DashboardCommand, FanLevel, PanelConfig, PowerState, ACK_REPLY,
};

use crate::{
    clock::{monotonic_ms, PanelClock},
    session::{Session, SessionKeys},
    store::EntryStore,
    views::{self, DashboardView},
};

const RECENT_ENTRIES: i64 = 5;

#[derive(Clone)]
pub struct AppState {
    control: Arc<Mutex<ControlState>>,
    store: EntryStore,
    sessions: SessionKeys,
    clock: PanelClock,
    config: Arc<PanelConfig>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

impl AppState {
    pub async fn new(config: PanelConfig) -> anyhow::Result<Self> {
        let store = EntryStore::new(&config.database);
        store.init().await.with_context(|| {
            format!(
                "failed to prepare temperature log at {}",
                config.database.display()
            )
        })?;
        let logged = store.count().await?;
        info!(
            "temperature log {} ready ({logged} entries)",
            config.database.display()
        );

        Ok(Self {
            control: Arc::new(Mutex::new(ControlState::new(&config))),
            store,
            sessions: SessionKeys::new(&config.secret_key),
            clock: PanelClock::new(&config.timezone),
            config: Arc::new(config),
        })
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = crate::settings::load().await?;
    let port = config.http_port;
    let app_state = AppState::new(config).await?;
    let app = router(app_state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind panel server at {addr}"))?;

    info!("panel listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(app_state: AppState) -> Router {
    let web_root = format!("{}/web", env!("CARGO_MANIFEST_DIR"));
    Router::new()
        .route("/", get(handle_dashboard))
        .route("/poststate", axum::routing::post(handle_post_state))
        .route("/login", get(handle_login_page).post(handle_login))
        .route("/logout", get(handle_logout))
        .route(ROUTE_REPORT, get(handle_device_report))
        .route(ROUTE_FETCH, get(handle_device_fetch))
        .route(ROUTE_ACK, get(handle_device_ack))
        .nest_service("/static", ServeDir::new(web_root))
        .with_state(app_state)
}

async fn handle_dashboard(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut session = state.sessions.read(&headers);

    let entries = match state.store.recent(RECENT_ENTRIES).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!("failed to read temperature log: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read temperature log",
            );
        }
    };

    let view = {
        let mut control = state.control.lock().await;
        let now_ms = monotonic_ms();
        if control.take_ack_notice(now_ms) {
            session.flash("Command received by system.");
        }
        DashboardView {
            power: control.power(),
            target_temp: control.target_temp(),
            fan_level: control.fan_level(),
            elapsed_on: control.elapsed_on(now_ms),
            last_seen: control.last_device_contact().to_string(),
        }
    };

    let flashes = session.take_flashes();
    let html = views::dashboard(&view, &entries, &flashes, session.logged_in);
    with_session(&state, &session, Html(html))
}

async fn handle_post_state(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    let mut session = state.sessions.read(&headers);
    if !session.logged_in {
        return error_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    }

    let Ok(Form(form)) = form else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid form submission");
    };
    let command = match parse_dashboard_command(&form) {
        Ok(command) => command,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    {
        let mut control = state.control.lock().await;
        control.apply_dashboard(command);
        info!(
            "dashboard command: {} target={} fan={}",
            control.power(),
            control.target_temp(),
            control.fan_level()
        );
    }

    session.flash("System state and temperature set");
    with_session(&state, &session, Redirect::to("/"))
}

fn parse_dashboard_command(
    form: &HashMap<String, String>,
) -> Result<DashboardCommand, &'static str> {
    let power = if form.contains_key("onoffswitch") {
        PowerState::On
    } else {
        PowerState::Off
    };

    let target_temp = form
        .get("temperature")
        .map(|value| value.trim().parse::<i32>())
        .transpose()
        .map_err(|_| "Invalid temperature value")?;

    let fan_level = form
        .get("fan")
        .map(|value| value.parse::<FanLevel>())
        .transpose()
        .map_err(|_| "Invalid fan level (0-3)")?;

    Ok(DashboardCommand {
        power,
        target_temp,
        fan_level,
    })
}

async fn handle_login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut session = state.sessions.read(&headers);
    let flashes = session.take_flashes();
    with_session(&state, &session, Html(views::login(None, &flashes)))
}

async fn handle_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Response {
    let mut session = state.sessions.read(&headers);

    let error = if form.username != state.config.username {
        Some("Invalid username")
    } else if form.password != state.config.password {
        Some("Invalid password")
    } else {
        None
    };

    if let Some(error) = error {
        info!("rejected login attempt for {:?}", form.username);
        let flashes = session.take_flashes();
        return with_session(&state, &session, Html(views::login(Some(error), &flashes)));
    }

    session.logged_in = true;
    session.flash("You were logged in");
    with_session(&state, &session, Redirect::to("/"))
}

async fn handle_logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let mut session = state.sessions.read(&headers);
    session.logged_in = false;
    session.flash("You were logged out");
    with_session(&state, &session, Redirect::to("/"))
}

async fn handle_device_report(
    State(state): State<AppState>,
    Path((temp, msg_id)): Path<(String, String)>,
) -> Response {
    let stamp = state.clock.stamp();
    state
        .control
        .lock()
        .await
        .record_device_contact(stamp.clone());

    let Some(temperature) = temp.trim().parse::<f64>().ok().filter(|value| value.is_finite())
    else {
        warn!("device report {{#{msg_id}}} with invalid temperature {temp:?}");
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    if let Err(err) = state.store.append(&stamp, temperature).await {
        warn!("failed to log device report {{#{msg_id}}}: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to store temperature",
        );
    }

    debug!("device report {{#{msg_id}}}: {temperature}");
    ACK_REPLY.into_response()
}

async fn handle_device_fetch(
    State(state): State<AppState>,
    Path(msg_id): Path<String>,
) -> Response {
    let stamp = state.clock.stamp();
    let frame = {
        let mut control = state.control.lock().await;
        control.record_device_contact(stamp);
        control.command_frame()
    };

    debug!("device fetch {{#{msg_id}}}: {frame}");
    frame.to_string().into_response()
}

async fn handle_device_ack(
    State(state): State<AppState>,
    Path(msg_id): Path<String>,
) -> Response {
    state.control.lock().await.acknowledge();
    debug!("device ack {{#{msg_id}}}");
    ACK_REPLY.into_response()
}

fn with_session(state: &AppState, session: &Session, body: impl IntoResponse) -> Response {
    ([state.sessions.set_cookie(session)], body).into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, message.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{
            header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
            Request,
        },
    };
    use tower::ServiceExt;

    use super::*;
    use crate::store::tests::temp_db;

    async fn test_state(name: &str) -> AppState {
        let config = PanelConfig {
            database: temp_db(name),
            ..PanelConfig::default()
        };
        AppState::new(config).await.unwrap()
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, cookie, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::post(uri).header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn login(state: &AppState) -> String {
        let (status, cookie, _) = send(
            state,
            post_form("/login", "username=lola&password=thecat", None),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        cookie.unwrap()
    }

    async fn fetch(state: &AppState) -> String {
        send(state, get("/extget/1", None)).await.2
    }

    #[tokio::test]
    async fn report_appends_one_entry() {
        let state = test_state("report").await;
        let before = state.clock.stamp();

        let (status, _, body) = send(&state, get("/extpost/21.5/7", None)).await;
        let after = state.clock.stamp();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ACK_REPLY);
        assert_eq!(state.store.count().await.unwrap(), 1);

        let entry = &state.store.recent(5).await.unwrap()[0];
        assert_eq!(entry.temperature, 21.5);
        assert!(entry.timestamp == before || entry.timestamp == after);

        let control = state.control.lock().await;
        assert_ne!(control.last_device_contact(), "[---]");
    }

    #[tokio::test]
    async fn malformed_report_leaves_log_untouched() {
        let state = test_state("report-malformed").await;

        let (status, _, _) = send(&state, get("/extpost/warm/8", None)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fetch_reports_pending_command_until_ack() {
        let state = test_state("fetch-ack").await;
        assert_eq!(fetch(&state).await, "0#OFF#15#3");

        let cookie = login(&state).await;
        let (status, _, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on&temperature=24", Some(&cookie)),
        )
        .await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        assert_eq!(fetch(&state).await, "1#ON#24#3");
        assert_eq!(fetch(&state).await, "1#ON#24#3");

        for _ in 0..2 {
            let (status, _, body) = send(&state, get("/getack/3", None)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, ACK_REPLY);

            let control = state.control.lock().await;
            assert!(!control.is_command_pending());
            assert!(control.is_device_acked());
            assert!(control.is_showing_elapsed());
        }
        assert_eq!(fetch(&state).await, "0#ON#24#3");
    }

    #[tokio::test]
    async fn post_state_requires_session() {
        let state = test_state("unauthorized").await;

        let (status, _, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on&temperature=24", None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(
            &state,
            post_form(
                "/poststate",
                "onoffswitch=on",
                Some("session=7b226c6f676765645f696e223a747275657d.00"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(fetch(&state).await, "0#OFF#15#3");
    }

    #[tokio::test]
    async fn malformed_temperature_is_rejected() {
        let state = test_state("bad-temperature").await;
        let cookie = login(&state).await;

        let (status, _, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on&temperature=hot", Some(&cookie)),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(fetch(&state).await, "0#OFF#15#3");
    }

    #[tokio::test]
    async fn wrong_password_is_reported_and_not_logged_in() {
        let state = test_state("bad-password").await;

        let (status, cookie, body) = send(
            &state,
            post_form("/login", "username=lola&password=thedog", None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Invalid password"));

        let (status, _, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on", cookie.as_deref()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_username_is_reported() {
        let state = test_state("bad-username").await;

        let (_, _, body) = send(
            &state,
            post_form("/login", "username=lolo&password=thecat", None),
        )
        .await;
        assert!(body.contains("Invalid username"));
    }

    #[tokio::test]
    async fn dashboard_shows_ack_notice_once() {
        let state = test_state("ack-notice").await;
        let cookie = login(&state).await;
        let (_, cookie, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on&temperature=21&fan=1", Some(&cookie)),
        )
        .await;
        let cookie = cookie.unwrap();
        send(&state, get("/getack/4", None)).await;

        let (status, cookie, body) = send(&state, get("/", Some(&cookie))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Command received by system."));
        assert!(body.contains("System state and temperature set"));
        assert!(body.contains("On time: 00 sec") || body.contains("On time: 01 sec"));

        let (_, _, body) = send(&state, get("/", cookie.as_deref())).await;
        assert!(!body.contains("Command received by system."));
        assert!(!body.contains("System state and temperature set"));
        assert!(body.contains("<strong>Medium</strong>"));
    }

    #[tokio::test]
    async fn dashboard_lists_latest_readings() {
        let state = test_state("dashboard-log").await;
        let (_, _, body) = send(&state, get("/", None)).await;
        assert!(body.contains("data unavailable"));

        for temp in ["20.0", "20.5", "21.0", "21.5", "22.0", "22.5"] {
            send(&state, get(&format!("/extpost/{temp}/1"), None)).await;
        }

        let (_, _, body) = send(&state, get("/", None)).await;
        assert!(body.contains("<strong>22.5&deg;C</strong>"));
        assert!(!body.contains("<td>20&deg;C</td>"));
        assert_eq!(body.matches("&deg;C</td></tr>").count(), 5);
    }

    #[tokio::test]
    async fn logout_drops_session() {
        let state = test_state("logout").await;
        let cookie = login(&state).await;

        let (status, cookie, _) = send(&state, get("/logout", Some(&cookie))).await;
        assert_eq!(status, StatusCode::SEE_OTHER);

        let (status, _, _) = send(
            &state,
            post_form("/poststate", "onoffswitch=on", cookie.as_deref()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn successful_login_redirects_home() {
        let state = test_state("login-redirect").await;
        let response = router(state.clone())
            .oneshot(post_form("/login", "username=lola&password=thecat", None))
            .await
            .unwrap();

        assert_eq!(response.headers().get(LOCATION).unwrap(), "/");
    }
}
