//! Application shell for Meet.
//!
//! Maps locations to views and owns the mounted view. Leaving a meeting
//! route unmounts the meeting, which tears the call down.

use std::sync::Arc;

use meet_core::{
    Landing, LoopbackNetwork, MeetingConfig, MeetingScreen, MeetingView, Route, RtcProvider,
};

/// Initialize tracing/logging. Safe to call more than once.
pub fn init_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("meet_core=info,meet_app=info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub enum View {
    Landing(Landing),
    Meeting(MeetingView),
    NotFound,
    /// The meeting route matched but the session could not be created.
    Unavailable(String),
}

pub struct App {
    provider: Arc<dyn RtcProvider>,
    config: MeetingConfig,
    route: Route,
    view: View,
}

impl App {
    pub fn new(provider: Arc<dyn RtcProvider>, config: MeetingConfig) -> Self {
        Self {
            provider,
            config,
            route: Route::Landing,
            view: View::Landing(Landing::new()),
        }
    }

    /// An app wired to an in-process provider.
    pub fn offline(config: MeetingConfig) -> Self {
        Self::new(Arc::new(LoopbackNetwork::new()), config)
    }

    pub fn config(&self) -> &MeetingConfig {
        &self.config
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut View {
        &mut self.view
    }

    /// Switch to the view for `location`. Must be called inside a tokio
    /// runtime when the location is a meeting.
    pub async fn navigate(&mut self, location: &str) -> &Route {
        let route = Route::recognize(location);
        if route == self.route && !matches!(self.view, View::Unavailable(_)) {
            return &self.route;
        }
        tracing::info!("navigating to {}", route.path());

        let previous = std::mem::replace(&mut self.view, View::NotFound);
        if let View::Meeting(meeting) = previous {
            meeting.unmount().await;
        }

        self.view = match &route {
            Route::Landing => View::Landing(Landing::new()),
            Route::Meeting { id } => {
                match MeetingView::mount(id.clone(), &self.config, self.provider.as_ref()) {
                    Ok(meeting) => View::Meeting(meeting),
                    Err(e) => {
                        tracing::error!("can not open meeting {id}: {e}");
                        View::Unavailable(e.to_string())
                    }
                }
            }
            Route::NotFound(path) => {
                tracing::warn!("no view for {path}");
                View::NotFound
            }
        };
        self.route = route;
        &self.route
    }

    /// The landing call-to-action: open a brand new meeting.
    pub async fn create_meeting(&mut self) -> &Route {
        let path = Landing::new().create_meeting().path();
        self.navigate(&path).await
    }

    /// Current meeting screen, if a meeting is mounted.
    pub async fn meeting_screen(&self) -> Option<MeetingScreen> {
        match &self.view {
            View::Meeting(meeting) => Some(meeting.screen().await),
            _ => None,
        }
    }

    pub async fn shutdown(mut self) {
        let view = std::mem::replace(&mut self.view, View::NotFound);
        if let View::Meeting(meeting) = view {
            meeting.unmount().await;
        }
        tracing::info!("app shut down");
    }
}
