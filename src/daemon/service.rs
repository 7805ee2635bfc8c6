use std::{collections::HashSet, sync::Arc};

use anyhow::{Context, Result};
use serde_json::{to_value, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    browser::{mirror::MirroredBrowser, Browser, BrowserEvent},
    enforcer::FocusEnforcer,
    store::{
        entities::{Session, SessionType, Task},
        repository::StateRepository,
    },
    timer::{
        clock::{badge, is_overtime, remaining, Badge},
        machine::{StartedSession, TimerStateMachine},
    },
    tracker::{domain_visit::DomainVisitTracker, task_time::TaskTimeTracker},
    utils::clock::Clock,
};

use super::{
    alarm::{Alarm, AlarmBridge},
    args::OrphanedVisits,
    protocol::{ack, error_reply, Input, Outbound, Request, RequestId},
};

/// Ties the timer, the enforcer and the trackers together. Every input is handled to completion
/// before the next one starts.
pub struct FocusService {
    machine: TimerStateMachine,
    enforcer: FocusEnforcer,
    tasks: TaskTimeTracker,
    visits: DomainVisitTracker,
    alarms: AlarmBridge,
    browser: Arc<MirroredBrowser>,
    repository: StateRepository,
    clock: Arc<dyn Clock>,
    orphaned_visits: OrphanedVisits,
    last_badge: Option<Badge>,
    resumed: bool,
}

impl FocusService {
    pub fn new(
        browser: Arc<MirroredBrowser>,
        repository: StateRepository,
        clock: Arc<dyn Clock>,
        alarms: AlarmBridge,
        orphaned_visits: OrphanedVisits,
    ) -> Self {
        Self {
            machine: TimerStateMachine::new(repository.clone(), clock.clone()),
            enforcer: FocusEnforcer::new(browser.clone(), repository.clone()),
            tasks: TaskTimeTracker::new(repository.clone(), clock.clone()),
            visits: DomainVisitTracker::new(browser.clone(), repository.clone(), clock.clone()),
            alarms,
            browser,
            repository,
            clock,
            orphaned_visits,
            last_badge: None,
            resumed: false,
        }
    }

    pub fn enforcer(&self) -> &FocusEnforcer {
        &self.enforcer
    }

    pub fn visits(&self) -> &DomainVisitTracker {
        &self.visits
    }

    pub fn alarms(&self) -> &AlarmBridge {
        &self.alarms
    }

    /// Executes the service event loop until shutdown or until every input sender is gone.
    /// Inputs already queued when shutdown is requested are still handled.
    pub async fn run(
        mut self,
        mut inputs: mpsc::Receiver<Input>,
        responses: mpsc::UnboundedSender<Outbound>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let input = tokio::select! {
                biased;
                input = inputs.recv() => input,
                _ = shutdown.cancelled() => None,
            };
            let Some(input) = input else {
                break;
            };
            match input {
                Input::Message { id, body } => {
                    let body = self.dispatch(id, body).await;
                    responses
                        .send(Outbound::Response { id, body })
                        .context("Host output channel is closed")
                        .inspect_err(|e| error!("Dropping response {id} {e:?}"))?;
                }
                Input::Event(event) => {
                    if let Err(e) = self.handle_event(event).await {
                        error!("Error handling browser event {e:?}");
                    }
                }
                Input::Alarm(alarm) => {
                    if let Err(e) = self.handle_alarm(alarm).await {
                        error!("Error handling alarm {alarm:?} {e:?}");
                    }
                }
            }
        }
        self.alarms.cancel();
        info!("Service loop finished");
        Ok(())
    }

    /// Decodes and handles a request. Failures become an error reply, never a crash.
    pub async fn dispatch(&mut self, id: RequestId, body: Value) -> Value {
        let request = match serde_json::from_value::<Request>(body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Rejecting request {id}: {e}");
                return error_reply(format!("Unknown action: {e}"));
            }
        };
        debug!("Handling request {id} {request:?}");
        match self.handle_request(request).await {
            Ok(body) => body,
            Err(e) => {
                error!("Request {id} failed {e:?}");
                error_reply(e)
            }
        }
    }

    pub async fn handle_request(&mut self, request: Request) -> Result<Value> {
        let reply = match request {
            Request::StartSession { session_type } => {
                to_value(self.start_session(session_type).await?)?
            }
            Request::StopSession => to_value(self.stop_session().await?)?,
            Request::GetTimerState => to_value(self.machine.state().await?)?,
            Request::GetSuggestedNext => to_value(self.machine.suggest_next().await?)?,
            Request::GetStreak => to_value(self.machine.compute_streak().await?)?,
            Request::TaskMovedToDoing { task_id } => {
                self.tasks.open_entry(&task_id).await?;
                ack()
            }
            Request::TaskMovedFromDoing { task_id } => {
                self.tasks.close_entry(&task_id).await?;
                ack()
            }
            Request::GetTasks => to_value(self.repository.tasks().await?)?,
            Request::SaveTasks { tasks } => {
                self.save_tasks(tasks).await?;
                ack()
            }
            Request::GetSettings => to_value(self.repository.settings().await?)?,
            Request::SaveSettings { settings } => {
                self.repository.save_settings(&settings).await?;
                ack()
            }
            Request::GetSessions => to_value(self.repository.sessions().await?)?,
            Request::GetTaskTimeEntries => to_value(self.repository.task_time_entries().await?)?,
            Request::GetDomainVisits => to_value(self.repository.domain_visits().await?)?,
            Request::UpdateTask { task } => {
                let mut tasks = self.repository.tasks().await?;
                if let Some(existing) = tasks.iter_mut().find(|t| t.id == task.id) {
                    *existing = task;
                    self.repository.save_tasks(&tasks).await?;
                } else {
                    debug!("No task with id {}, nothing updated", task.id);
                }
                ack()
            }
        };
        Ok(reply)
    }

    /// Starts a session, completing a running one through the full stop path first.
    pub async fn start_session(&mut self, session_type: SessionType) -> Result<StartedSession> {
        if self.machine.state().await?.is_running() {
            self.stop_session().await?;
        }

        let started = self.machine.start_session(session_type).await?;
        let nominal = std::time::Duration::from_secs(u64::from(
            started.timer_state.duration.unwrap_or_default(),
        ));
        self.alarms.arm(started.session.id, nominal);

        if session_type.is_focus() {
            if let Err(e) = self.enforcer.activate().await {
                error!("Blocking is not fully active {e:?}");
            }
            if let Err(e) = self.open_doing_entry().await {
                error!("Couldn't start tracking the doing task {e:?}");
            }
        } else if let Err(e) = self.visits.start().await {
            error!("Couldn't start domain tracking {e:?}");
        }

        if let Err(e) = self.refresh_badge().await {
            warn!("Couldn't refresh badge {e:?}");
        }
        Ok(started)
    }

    async fn open_doing_entry(&self) -> Result<()> {
        if let Some(task_id) = self.tasks.doing_task().await? {
            self.tasks.open_entry(&task_id).await?;
        }
        Ok(())
    }

    pub async fn stop_session(&mut self) -> Result<Option<Session>> {
        let state = self.machine.state().await?;
        if !state.is_running() {
            return Ok(None);
        }

        self.alarms.cancel();
        if state.is_focus_running() {
            if let Err(e) = self.tasks.close_all().await {
                error!("Couldn't close task time entries {e:?}");
            }
            if let Err(e) = self.enforcer.deactivate().await {
                error!("Couldn't remove blocking rules {e:?}");
            }
        } else if let Err(e) = self.visits.stop().await {
            error!("Couldn't close the current domain visit {e:?}");
        }

        let session = self.machine.stop_session().await?;
        if let Err(e) = self.refresh_badge().await {
            warn!("Couldn't refresh badge {e:?}");
        }
        Ok(session)
    }

    /// Saves the board and treats changes of the doing column like explicit moves.
    async fn save_tasks(&mut self, tasks: Vec<Task>) -> Result<()> {
        let doing = |tasks: &[Task]| {
            tasks
                .iter()
                .filter(|t| t.is_doing())
                .map(|t| t.id.clone())
                .collect::<HashSet<_>>()
        };
        let before = doing(&self.repository.tasks().await?);
        let after = doing(&tasks);
        self.repository.save_tasks(&tasks).await?;

        for task_id in before.difference(&after) {
            self.tasks.close_entry(task_id).await?;
        }
        for task_id in after.difference(&before) {
            self.tasks.open_entry(task_id).await?;
        }
        Ok(())
    }

    pub async fn handle_event(&mut self, event: BrowserEvent) -> Result<()> {
        self.browser.apply(&event)?;
        match event {
            BrowserEvent::Snapshot {
                focused_window_id, ..
            } => {
                self.visits.set_window_focused(focused_window_id.is_some());
                if !self.resumed {
                    self.resumed = true;
                    self.resume().await?;
                }
            }
            BrowserEvent::TabUpdated { tab_id, url } => {
                if let Err(e) = self.enforcer.on_url_changed(tab_id, &url).await {
                    warn!("Couldn't redirect tab {tab_id} {e:?}");
                }
                self.visits.on_tab_updated(tab_id, &url).await?;
            }
            BrowserEvent::TabActivated { tab_id, .. } => {
                self.visits.on_tab_activated(tab_id).await?;
            }
            BrowserEvent::WindowFocusChanged { window_id } => {
                self.visits.on_window_focus_changed(window_id).await?;
            }
            BrowserEvent::ScreenLocked => {
                if let Some(session) = self.stop_session().await? {
                    info!("Screen locked, stopped session {}", session.id);
                }
            }
            BrowserEvent::TabCreated { .. } | BrowserEvent::TabRemoved { .. } => {}
        }
        Ok(())
    }

    pub async fn handle_alarm(&mut self, alarm: Alarm) -> Result<()> {
        match alarm {
            Alarm::SessionEnd(session_id) => {
                let state = self.machine.state().await?;
                if state.session_id != Some(session_id) {
                    debug!("Ignoring alarm of finished session {session_id}");
                    return Ok(());
                }
                self.machine.on_alarm_fired().await?;
                self.refresh_badge().await
            }
            Alarm::BadgeRefresh => self.refresh_badge().await,
        }
    }

    /// Pushes the badge if it changed since the last push.
    async fn refresh_badge(&mut self) -> Result<()> {
        let state = self.machine.state().await?;
        let badge = badge(&state, self.clock.time());
        if self.last_badge.as_ref() == Some(&badge) {
            return Ok(());
        }
        self.browser.set_badge(badge.clone()).await?;
        self.last_badge = Some(badge);
        Ok(())
    }

    /// Restores what lived only in the previous process: the session alarm, blocking or domain
    /// tracking. Rules left behind outside a focus session are removed. Runs once, when the
    /// browser first reports its state.
    pub async fn resume(&mut self) -> Result<()> {
        let orphaned = self
            .repository
            .domain_visits()
            .await?
            .iter()
            .filter(|v| v.is_open() && Some(v.id) != self.visits.current_visit())
            .count();
        if orphaned > 0 {
            warn!("Found {orphaned} domain visits left open by an earlier run");
            if self.orphaned_visits == OrphanedVisits::Close {
                self.visits.close_orphaned_visits().await?;
            }
        }

        let state = self.machine.state().await?;
        if !state.is_focus_running() && !self.browser.installed_rules().await?.is_empty() {
            info!("Removing blocking rules left installed by an earlier run");
            if let Err(e) = self.enforcer.deactivate().await {
                error!("Couldn't remove stale blocking rules {e:?}");
            }
        }

        let (Some(session_type), Some(session_id)) = (state.running_type(), state.session_id)
        else {
            return self.refresh_badge().await;
        };
        info!("Resuming {session_type:?} session {session_id}");

        let now = self.clock.time();
        if is_overtime(&state, now) {
            if !state.alarm_fired {
                self.machine.on_alarm_fired().await?;
            }
        } else {
            let left = remaining(&state, now).to_std().unwrap_or_default();
            self.alarms.arm(session_id, left);
        }

        if session_type.is_focus() {
            if let Err(e) = self.enforcer.activate().await {
                error!("Blocking is not fully active {e:?}");
            }
        } else if !self.visits.is_listening() {
            self.visits.start().await?;
        }
        self.refresh_badge().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map, Value};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        browser::{
            mirror::{HostCommand, MirroredBrowser},
            Browser, BrowserEvent, Tab,
        },
        enforcer::rules::build_rules,
        daemon::{
            alarm::{Alarm, AlarmBridge},
            args::OrphanedVisits,
            protocol::{Input, Outbound},
        },
        store::{
            entities::{DomainVisit, SessionStatus, SessionType, Task, TaskColumn, TimerState},
            memory::{FailingStore, MemoryStore},
            repository::StateRepository,
            StoreKey,
        },
        utils::{
            clock::{Clock, ManualClock},
            logging::TEST_LOGGING,
        },
    };

    use super::FocusService;

    const BLOCKED: &str = "chrome-extension://abc/blocked/blocked.html";

    struct Fixture {
        service: FocusService,
        browser: Arc<MirroredBrowser>,
        repository: StateRepository,
        clock: Arc<ManualClock>,
        commands: mpsc::UnboundedReceiver<HostCommand>,
        _inputs: mpsc::Receiver<Input>,
    }

    fn tab(id: i64, window_id: i64, url: &str, active: bool) -> Tab {
        Tab {
            id,
            window_id,
            url: Some(url.into()),
            active,
        }
    }

    fn task(id: &str, column: TaskColumn) -> Task {
        Task {
            id: id.into(),
            column,
            extra: Map::new(),
        }
    }

    fn setup_with(repository: StateRepository, orphaned_visits: OrphanedVisits) -> Fixture {
        *TEST_LOGGING;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 15, 9, 0, 0).unwrap(),
        ));
        let (command_sender, commands) = mpsc::unbounded_channel();
        let browser = Arc::new(MirroredBrowser::new(
            "chrome-extension://abc".into(),
            command_sender,
        ));
        let (input_sender, inputs) = mpsc::channel(16);
        let alarms = AlarmBridge::new(input_sender, clock.clone(), CancellationToken::new());
        let service = FocusService::new(
            browser.clone(),
            repository.clone(),
            clock.clone(),
            alarms,
            orphaned_visits,
        );
        Fixture {
            service,
            browser,
            repository,
            clock,
            commands,
            _inputs: inputs,
        }
    }

    fn setup() -> Fixture {
        setup_with(
            StateRepository::new(Arc::new(MemoryStore::new())),
            OrphanedVisits::Leave,
        )
    }

    async fn snapshot(f: &mut Fixture, tabs: Vec<Tab>) -> Result<()> {
        f.service
            .handle_event(BrowserEvent::Snapshot {
                tabs,
                focused_window_id: Some(1),
                extension_origin: None,
                rules: vec![],
            })
            .await
    }

    async fn request(f: &mut FocusService, body: Value) -> Value {
        f.dispatch(1, body).await
    }

    async fn url_of(browser: &MirroredBrowser, id: i64) -> Option<String> {
        browser.tab(id).await.ok().flatten().and_then(|t| t.url)
    }

    fn drain(commands: &mut mpsc::UnboundedReceiver<HostCommand>) -> Vec<HostCommand> {
        let mut all = vec![];
        while let Ok(command) = commands.try_recv() {
            all.push(command);
        }
        all
    }

    #[tokio::test]
    async fn test_focus_session_end_to_end() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![tab(1, 1, "https://x.com/home", true)]).await?;
        f.repository
            .save_tasks(&[task("t1", TaskColumn::Doing), task("t2", TaskColumn::Todo)])
            .await?;

        let reply = request(
            &mut f.service,
            json!({ "action": "startSession", "type": "focus" }),
        )
        .await;
        assert_eq!(reply["timerState"]["status"], "running");
        assert_eq!(reply["session"]["type"], "focus");
        assert_eq!(f.browser.installed_rules().await?.len(), 3);
        assert_eq!(url_of(&f.browser, 1).await.as_deref(), Some(BLOCKED));
        assert!(f.service.alarms().is_armed());

        let entries = f.repository.task_time_entries().await?;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].task_id, "t1");

        f.clock.advance(Duration::minutes(25));
        let session_id = f.repository.timer_state().await?.session_id.unwrap();
        f.service.handle_alarm(Alarm::SessionEnd(session_id)).await?;
        let state = f.repository.timer_state().await?;
        assert!(state.alarm_fired);
        assert!(state.is_running());

        f.clock.advance(Duration::minutes(2));
        let reply = request(&mut f.service, json!({ "action": "stopSession" })).await;
        assert_eq!(reply["status"], "completed");

        let sessions = f.repository.sessions().await?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].elapsed(), Some(Duration::minutes(27)));
        assert!(f.browser.installed_rules().await?.is_empty());
        assert_eq!(url_of(&f.browser, 1).await.as_deref(), Some("https://x.com/home"));
        assert!(f
            .repository
            .task_time_entries()
            .await?
            .iter()
            .all(|e| !e.is_open()));
        assert_eq!(f.repository.timer_state().await?.cycle_position, 2);
        assert!(!f.service.alarms().is_armed());

        let badges = drain(&mut f.commands)
            .into_iter()
            .filter_map(|c| match c {
                HostCommand::SetBadge { text, .. } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(badges, vec!["", "25", "!", ""]);
        Ok(())
    }

    #[tokio::test]
    async fn test_focus_session_without_doing_task() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![]).await?;
        request(
            &mut f.service,
            json!({ "action": "startSession", "type": "focus" }),
        )
        .await;
        f.clock.advance(Duration::minutes(10));
        let reply = request(&mut f.service, json!({ "action": "stopSession" })).await;
        assert_eq!(reply["status"], "completed");

        let sessions = f.repository.sessions().await?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_type, SessionType::Focus);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[0].elapsed(), Some(Duration::minutes(10)));
        assert!(f.repository.task_time_entries().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_tracking_failures_leave_timer_consistent() -> Result<()> {
        let store = Arc::new(FailingStore::new());
        let mut f = setup_with(StateRepository::new(store.clone()), OrphanedVisits::Leave);
        snapshot(&mut f, vec![tab(1, 1, "https://a.example.org/", true)]).await?;
        f.repository
            .save_tasks(&[task("t1", TaskColumn::Doing)])
            .await?;

        store.fail_reads(StoreKey::TaskTimeEntries, true);
        let reply = request(
            &mut f.service,
            json!({ "action": "startSession", "type": "focus" }),
        )
        .await;
        assert_eq!(reply["timerState"]["status"], "running");
        let reply = request(&mut f.service, json!({ "action": "stopSession" })).await;
        assert_eq!(reply["status"], "completed");
        assert!(!f.repository.timer_state().await?.is_running());
        store.fail_reads(StoreKey::TaskTimeEntries, false);

        f.service.start_session(SessionType::ShortBreak).await?;
        store.fail_reads(StoreKey::DomainVisits, true);
        assert!(f.service.stop_session().await?.is_some());
        assert!(!f.repository.timer_state().await?.is_running());
        store.fail_reads(StoreKey::DomainVisits, false);

        // The visit the failed stop couldn't close is closed by the next break.
        f.service.start_session(SessionType::ShortBreak).await?;
        let visits = f.repository.domain_visits().await?;
        assert_eq!(visits.len(), 2);
        assert!(!visits[0].is_open());
        assert!(visits[1].is_open());
        Ok(())
    }

    #[tokio::test]
    async fn test_focus_to_break_switch_tears_down_blocking() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![tab(1, 1, "https://docs.example.org/", true)]).await?;
        f.service.start_session(SessionType::Focus).await?;
        assert!(f.service.enforcer().is_active());

        f.service.start_session(SessionType::ShortBreak).await?;
        assert!(!f.service.enforcer().is_active());
        assert!(f.browser.installed_rules().await?.is_empty());
        assert!(f.service.visits().is_listening());

        let sessions = f.repository.sessions().await?;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].status, SessionStatus::Completed);
        assert_eq!(sessions[1].session_type, SessionType::ShortBreak);

        let visits = f.repository.domain_visits().await?;
        assert_eq!(visits.len(), 1);
        assert_eq!(visits[0].domain, "docs.example.org");
        assert_eq!(visits[0].session_id, sessions[1].id);
        Ok(())
    }

    #[tokio::test]
    async fn test_break_tracking_follows_browser() -> Result<()> {
        let mut f = setup();
        snapshot(
            &mut f,
            vec![
                tab(1, 1, "https://a.example.org/", true),
                tab(2, 1, "https://b.example.org/", false),
            ],
        )
        .await?;
        f.service.start_session(SessionType::LongBreak).await?;

        f.service
            .handle_event(BrowserEvent::TabActivated {
                tab_id: 2,
                window_id: 1,
            })
            .await?;
        f.service
            .handle_event(BrowserEvent::WindowFocusChanged { window_id: None })
            .await?;
        f.service
            .handle_event(BrowserEvent::WindowFocusChanged { window_id: Some(1) })
            .await?;
        f.service
            .handle_event(BrowserEvent::TabUpdated {
                tab_id: 2,
                url: "https://x.com/".into(),
            })
            .await?;
        f.service.stop_session().await?;

        let domains = f
            .repository
            .domain_visits()
            .await?
            .into_iter()
            .map(|v: DomainVisit| (v.domain, v.ended_at.is_some()))
            .collect::<Vec<_>>();
        assert_eq!(
            domains,
            vec![
                ("a.example.org".to_string(), true),
                ("b.example.org".to_string(), true),
                ("b.example.org".to_string(), true),
                ("x.com".to_string(), true),
            ]
        );
        // Breaks never block.
        assert_eq!(url_of(&f.browser, 2).await.as_deref(), Some("https://x.com/"));
        Ok(())
    }

    #[tokio::test]
    async fn test_listener_blocks_navigation_during_focus() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![tab(1, 1, "https://docs.example.org/", true)]).await?;
        f.service.start_session(SessionType::Focus).await?;

        f.browser.apply(&BrowserEvent::TabCreated {
            tab: tab(5, 1, "about:blank", false),
        })?;
        f.service
            .handle_event(BrowserEvent::TabUpdated {
                tab_id: 5,
                url: "https://mail.google.com/".into(),
            })
            .await?;
        assert_eq!(url_of(&f.browser, 5).await.as_deref(), Some(BLOCKED));
        assert_eq!(f.service.enforcer().fallback_redirects(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_screen_lock_stops_session() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![]).await?;
        f.service.handle_event(BrowserEvent::ScreenLocked).await?;
        assert!(f.repository.sessions().await?.is_empty());

        f.service.start_session(SessionType::Focus).await?;
        f.service.handle_event(BrowserEvent::ScreenLocked).await?;
        assert!(!f.repository.timer_state().await?.is_running());
        assert!(f.browser.installed_rules().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_alarm_is_ignored() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![]).await?;
        let first = f.service.start_session(SessionType::ShortBreak).await?;
        f.service.start_session(SessionType::Focus).await?;
        f.service
            .handle_alarm(Alarm::SessionEnd(first.session.id))
            .await?;
        assert!(!f.repository.timer_state().await?.alarm_fired);
        Ok(())
    }

    #[tokio::test]
    async fn test_task_moves_and_saved_board() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![]).await?;
        assert_eq!(
            request(
                &mut f.service,
                json!({ "action": "taskMovedToDoing", "taskId": "t1" })
            )
            .await,
            json!({ "ok": true })
        );
        assert!(f.repository.task_time_entries().await?.is_empty());

        f.service.start_session(SessionType::Focus).await?;
        request(
            &mut f.service,
            json!({ "action": "taskMovedToDoing", "taskId": "t1" }),
        )
        .await;
        request(
            &mut f.service,
            json!({ "action": "taskMovedFromDoing", "taskId": "t1" }),
        )
        .await;

        let board = json!([
            { "id": "t1", "column": "todo", "title": "a" },
            { "id": "t2", "column": "doing", "title": "b" }
        ]);
        request(
            &mut f.service,
            json!({ "action": "saveTasks", "tasks": board }),
        )
        .await;
        assert_eq!(
            request(&mut f.service, json!({ "action": "getTasks" })).await,
            board
        );

        let entries = f.repository.task_time_entries().await?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].task_id, "t1");
        assert!(!entries[0].is_open());
        assert_eq!(entries[1].task_id, "t2");
        assert!(entries[1].is_open());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_task_replaces_by_id() -> Result<()> {
        let mut f = setup();
        f.repository
            .save_tasks(&[task("t1", TaskColumn::Todo)])
            .await?;
        let task = json!({ "id": "t1", "column": "done", "title": "x" });
        request(
            &mut f.service,
            json!({ "action": "updateTask", "task": task }),
        )
        .await;
        request(
            &mut f.service,
            json!({ "action": "updateTask", "task": { "id": "t9", "column": "done" } }),
        )
        .await;
        let tasks = f.repository.tasks().await?;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].column, TaskColumn::Done);
        assert_eq!(tasks[0].extra["title"], "x");
        Ok(())
    }

    #[tokio::test]
    async fn test_settings_round_trip_and_defaults() -> Result<()> {
        let mut f = setup();
        let reply = request(&mut f.service, json!({ "action": "getSettings" })).await;
        assert_eq!(
            reply["blockedDomains"],
            json!(["x.com", "web.whatsapp.com", "mail.google.com"])
        );
        request(
            &mut f.service,
            json!({ "action": "saveSettings", "settings": { "blockedDomains": ["example.org"] } }),
        )
        .await;
        let reply = request(&mut f.service, json!({ "action": "getSettings" })).await;
        assert_eq!(reply["blockedDomains"], json!(["example.org"]));
        assert_eq!(reply["tags"], json!({}));
        Ok(())
    }

    #[tokio::test]
    async fn test_queries() -> Result<()> {
        let mut f = setup();
        assert_eq!(
            request(&mut f.service, json!({ "action": "getSuggestedNext" })).await,
            json!("focus")
        );
        assert_eq!(
            request(&mut f.service, json!({ "action": "getStreak" })).await,
            json!(0)
        );
        assert_eq!(
            request(&mut f.service, json!({ "action": "getTimerState" })).await["status"],
            "idle"
        );
        assert_eq!(
            request(&mut f.service, json!({ "action": "stopSession" })).await,
            Value::Null
        );
        for action in ["getSessions", "getTaskTimeEntries", "getDomainVisits"] {
            assert_eq!(
                request(&mut f.service, json!({ "action": action })).await,
                json!([])
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_requests_get_error_replies() -> Result<()> {
        let mut f = setup();
        let reply = request(&mut f.service, json!({ "action": "selfDestruct" })).await;
        assert!(reply["error"].is_string());
        let reply = request(
            &mut f.service,
            json!({ "action": "startSession", "type": "nap" }),
        )
        .await;
        assert!(reply["error"].is_string());
        assert!(f.repository.sessions().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_running_focus_session() -> Result<()> {
        let repository = StateRepository::new(Arc::new(MemoryStore::new()));
        let mut before = setup_with(repository.clone(), OrphanedVisits::Leave);
        snapshot(&mut before, vec![]).await?;
        before.service.start_session(SessionType::Focus).await?;
        let started_at = before.clock.time();
        drop(before);

        // Browser restarted: rules are still installed, the tab was reopened.
        let mut after = setup_with(repository.clone(), OrphanedVisits::Leave);
        after.clock.advance(Duration::minutes(10));
        let rules = build_rules(&[
            "x.com".into(),
            "web.whatsapp.com".into(),
            "mail.google.com".into(),
        ]);
        after
            .service
            .handle_event(BrowserEvent::Snapshot {
                tabs: vec![tab(1, 1, "https://web.whatsapp.com/", true)],
                focused_window_id: Some(1),
                extension_origin: None,
                rules,
            })
            .await?;

        assert_eq!(after.browser.installed_rules().await?.len(), 3);
        assert_eq!(url_of(&after.browser, 1).await.as_deref(), Some(BLOCKED));
        assert!(after.service.alarms().is_armed());
        let state = repository.timer_state().await?;
        assert_eq!(state.started_at, Some(started_at));
        assert!(!state.alarm_fired);
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_past_due_marks_alarm() -> Result<()> {
        let repository = StateRepository::new(Arc::new(MemoryStore::new()));
        let mut before = setup_with(repository.clone(), OrphanedVisits::Leave);
        before.service.start_session(SessionType::ShortBreak).await?;
        drop(before);

        let mut after = setup_with(repository.clone(), OrphanedVisits::Leave);
        after.clock.advance(Duration::minutes(6));
        snapshot(&mut after, vec![tab(1, 1, "https://example.org/", true)]).await?;

        let state = repository.timer_state().await?;
        assert!(state.alarm_fired);
        assert!(!after.service.alarms().is_armed());
        assert!(after.service.visits().is_listening());
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_orphaned_visits_policy() -> Result<()> {
        for (policy, closed) in [(OrphanedVisits::Leave, false), (OrphanedVisits::Close, true)] {
            let repository = StateRepository::new(Arc::new(MemoryStore::new()));
            let mut before = setup_with(repository.clone(), OrphanedVisits::Leave);
            snapshot(&mut before, vec![tab(1, 1, "https://a.example.org/", true)]).await?;
            before.service.start_session(SessionType::ShortBreak).await?;
            drop(before);

            repository.save_timer_state(&TimerState::idle(1)).await?;
            let mut after = setup_with(repository.clone(), policy);
            snapshot(&mut after, vec![]).await?;

            let visits = repository.domain_visits().await?;
            assert_eq!(visits.len(), 1);
            assert_eq!(visits[0].ended_at.is_some(), closed);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_removes_rules_outside_focus() -> Result<()> {
        let blocklist = ["x.com".to_string(), "mail.google.com".to_string()];
        for running_break in [false, true] {
            let repository = StateRepository::new(Arc::new(MemoryStore::new()));
            if running_break {
                let mut before = setup_with(repository.clone(), OrphanedVisits::Leave);
                before.service.start_session(SessionType::ShortBreak).await?;
            }

            let mut after = setup_with(repository.clone(), OrphanedVisits::Leave);
            after
                .service
                .handle_event(BrowserEvent::Snapshot {
                    tabs: vec![],
                    focused_window_id: Some(1),
                    extension_origin: None,
                    rules: build_rules(&blocklist),
                })
                .await?;
            assert!(after.browser.installed_rules().await?.is_empty());
            assert!(!after.service.enforcer().is_active());

            after.service.start_session(SessionType::ShortBreak).await?;
            assert!(after.browser.installed_rules().await?.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_resumed_break_without_focused_window() -> Result<()> {
        let repository = StateRepository::new(Arc::new(MemoryStore::new()));
        let mut before = setup_with(repository.clone(), OrphanedVisits::Leave);
        before.service.start_session(SessionType::LongBreak).await?;
        drop(before);

        let mut after = setup_with(repository.clone(), OrphanedVisits::Leave);
        after
            .service
            .handle_event(BrowserEvent::Snapshot {
                tabs: vec![tab(1, 1, "https://a.example.org/", true)],
                focused_window_id: None,
                extension_origin: None,
                rules: vec![],
            })
            .await?;
        assert!(after.service.visits().is_listening());
        assert!(repository.domain_visits().await?.is_empty());

        after
            .service
            .handle_event(BrowserEvent::WindowFocusChanged { window_id: Some(1) })
            .await?;
        assert_eq!(repository.domain_visits().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_resume_runs_once() -> Result<()> {
        let mut f = setup();
        snapshot(&mut f, vec![]).await?;
        f.service.start_session(SessionType::ShortBreak).await?;
        snapshot(&mut f, vec![tab(1, 1, "https://a.example.org/", true)]).await?;
        assert!(f.repository.domain_visits().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_alarm_input_through_loop() -> Result<()> {
        let f = setup();
        let (sender, receiver) = mpsc::channel(4);
        let (responses, mut outbound) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        sender
            .send(Input::Message {
                id: 7,
                body: json!({ "action": "startSession", "type": "focus" }),
            })
            .await?;
        sender
            .send(Input::Message {
                id: 8,
                body: json!({ "action": "getTimerState" }),
            })
            .await?;
        drop(sender);
        f.service.run(receiver, responses, shutdown).await?;

        let mut ids = vec![];
        while let Ok(Outbound::Response { id, body }) = outbound.try_recv() {
            assert!(body.get("error").is_none());
            ids.push(id);
        }
        assert_eq!(ids, vec![7, 8]);
        Ok(())
    }
}
