//! GUI for BioTrack using egui

use eframe::egui;
use egui_plot::{Line, Plot, PlotPoints};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use chrono::{Duration as ChronoDuration, Local};
use log::{debug, error, info};

use crate::acquisition::AcquisitionEvent;
use crate::auth::{AuthProvider, IdentityToolkitAuth, User};
use crate::config::{default_export_dir, settings_file_path, Config, APP_NAME};
use crate::export::{default_export_name, export_to_csv};
use crate::sample::{parse_day, Sample};
use crate::session::{LiveState, MonitoringSession};
use crate::settings::AppSettings;
use crate::source::{AdapterKind, SourceAdapter};
use crate::storage::Storage;
use crate::units::{Metric, Severity, Thresholds};

const MIN_PASSWORD_LEN: usize = 6;

/// Message from worker threads to the UI
enum UiMessage {
    SignedIn(User),
    AuthNotice(String),
    AuthFailed(String),
    /// Probe result tagged with the generation that requested it
    AdapterSelected(u64, SourceAdapter),
}

#[derive(Clone, Copy)]
enum AuthAction {
    SignIn,
    SignUp,
    ResetPassword,
}

#[derive(PartialEq, Clone, Copy)]
enum Tab {
    Dashboard,
    History,
    Settings,
}

#[derive(PartialEq, Clone, Copy)]
enum Status {
    Info,
    Success,
    Error,
}

impl Status {
    fn color(self) -> egui::Color32 {
        match self {
            Status::Info => egui::Color32::GRAY,
            Status::Success => egui::Color32::from_rgb(100, 255, 100),
            Status::Error => egui::Color32::from_rgb(255, 100, 100),
        }
    }
}

/// Check login form input before anything goes over the network
fn validate_credentials(email: &str, password: &str, action: AuthAction) -> Result<(), &'static str> {
    match action {
        AuthAction::ResetPassword if email.trim().is_empty() => Err("Please enter your email address"),
        AuthAction::ResetPassword => Ok(()),
        _ if email.trim().is_empty() || password.is_empty() => Err("Please fill in all fields"),
        AuthAction::SignUp if password.chars().count() < MIN_PASSWORD_LEN => {
            Err("Password must be at least 6 characters")
        }
        _ => Ok(()),
    }
}

/// Only the newest probe may start a session; older ones were superseded
/// by a later IP change or a logout.
fn is_current_probe(current: u64, received: u64) -> bool {
    current == received
}

fn severity_color(severity: Severity) -> egui::Color32 {
    match severity {
        Severity::Normal => egui::Color32::from_rgb(100, 200, 100),
        Severity::Warning => egui::Color32::from_rgb(255, 180, 100),
        Severity::Critical => egui::Color32::from_rgb(255, 100, 100),
    }
}

fn metric_color(metric: Metric) -> egui::Color32 {
    match metric {
        Metric::Glucose => egui::Color32::from_rgb(255, 107, 107),
        Metric::Ph => egui::Color32::from_rgb(78, 205, 196),
        Metric::Oxygen => egui::Color32::from_rgb(69, 183, 209),
    }
}

/// Main application state
pub struct BioTrackApp {
    config: Config,
    db_path: String,
    settings: AppSettings,

    // Worker threads report here
    ui_tx: Sender<UiMessage>,
    ui_rx: Receiver<UiMessage>,

    // Login
    user: Option<User>,
    email: String,
    password: String,
    auth_busy: bool,
    auth_message: String,
    auth_status: Status,

    // Monitoring
    session: MonitoringSession,
    events: Option<Receiver<AcquisitionEvent>>,
    probing: bool,
    probe_generation: u64,
    status_message: String,
    status: Status,

    // History
    current_tab: Tab,
    history_from: String,
    history_to: String,
    history: Vec<Sample>,

    // Settings tab edits a copy until saved
    settings_draft: AppSettings,
    device_ip_draft: String,
}

impl BioTrackApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: Config) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.override_text_color = Some(egui::Color32::from_gray(220));
        cc.egui_ctx.set_visuals(visuals);

        let settings = AppSettings::load(settings_file_path());
        let db_path = config.database_path();
        let today = Local::now().date_naive();
        let (ui_tx, ui_rx) = channel();

        Self {
            device_ip_draft: settings.effective_device_ip(&config.device_ip).to_string(),
            settings_draft: settings.clone(),
            settings,
            config,
            db_path,
            ui_tx,
            ui_rx,
            user: None,
            email: String::new(),
            password: String::new(),
            auth_busy: false,
            auth_message: String::new(),
            auth_status: Status::Info,
            session: MonitoringSession::new(),
            events: None,
            probing: false,
            probe_generation: 0,
            status_message: String::new(),
            status: Status::Info,
            current_tab: Tab::Dashboard,
            history_from: (today - ChronoDuration::days(7)).format("%Y-%m-%d").to_string(),
            history_to: today.format("%Y-%m-%d").to_string(),
            history: Vec::new(),
        }
    }

    fn set_status(&mut self, status: Status, message: impl Into<String>) {
        self.status = status;
        self.status_message = message.into();
    }

    fn start_auth(&mut self, action: AuthAction) {
        if self.auth_busy {
            return;
        }
        if let Err(message) = validate_credentials(&self.email, &self.password, action) {
            self.auth_status = Status::Error;
            self.auth_message = message.to_string();
            return;
        }
        let Some(api_key) = self.config.auth_api_key.clone() else {
            self.auth_status = Status::Error;
            self.auth_message = "No auth_api_key configured; continue offline instead".to_string();
            return;
        };

        let url = self.config.auth_url.clone();
        let email = self.email.trim().to_string();
        let password = self.password.clone();
        let tx = self.ui_tx.clone();

        self.auth_busy = true;
        self.auth_status = Status::Info;
        self.auth_message = "Contacting server...".to_string();

        thread::spawn(move || {
            let message = match IdentityToolkitAuth::new(&url, &api_key) {
                Ok(auth) => match action {
                    AuthAction::SignIn => match auth.sign_in(&email, &password) {
                        Ok(user) => UiMessage::SignedIn(user),
                        Err(e) => UiMessage::AuthFailed(e.to_string()),
                    },
                    AuthAction::SignUp => match auth.sign_up(&email, &password) {
                        Ok(()) => UiMessage::AuthNotice("Account created successfully!".to_string()),
                        Err(e) => UiMessage::AuthFailed(e.to_string()),
                    },
                    AuthAction::ResetPassword => match auth.reset_password(&email) {
                        Ok(()) => UiMessage::AuthNotice("Password reset email sent!".to_string()),
                        Err(e) => UiMessage::AuthFailed(e.to_string()),
                    },
                },
                Err(e) => UiMessage::AuthFailed(e.to_string()),
            };
            let _ = tx.send(message);
        });
    }

    fn log_in(&mut self, user: User) {
        info!("Logged in as {}", if user.email.is_empty() { &user.uid } else { &user.email });
        self.user = Some(user);
        self.password.clear();
        self.auth_message.clear();
        self.current_tab = Tab::Dashboard;
        self.refresh_history();
        self.start_monitoring();
    }

    fn log_out(&mut self) {
        if let Some(uid) = self.session.user_id() {
            info!("Logging out {}", uid);
        }
        self.session.stop();
        self.events = None;
        self.probing = false;
        self.probe_generation += 1;
        self.user = None;
        self.history.clear();
        self.status_message.clear();
    }

    /// Stop any running loop and probe the device on a worker thread
    fn start_monitoring(&mut self) {
        if self.user.is_none() {
            return;
        }
        self.session.stop();
        self.events = None;

        let ip = self.settings.effective_device_ip(&self.config.device_ip).to_string();
        let timeout = self.config.fetch_timeout;
        let tx = self.ui_tx.clone();
        self.probe_generation += 1;
        let generation = self.probe_generation;

        self.probing = true;
        self.set_status(Status::Info, format!("Looking for device at {}...", ip));

        thread::spawn(move || {
            let adapter = SourceAdapter::select(&ip, timeout);
            let _ = tx.send(UiMessage::AdapterSelected(generation, adapter));
        });
    }

    fn adapter_ready(&mut self, adapter: SourceAdapter) {
        self.probing = false;
        let Some(uid) = self.user.as_ref().map(|user| user.uid.clone()) else {
            return;
        };

        let storage = match Storage::new(&self.db_path) {
            Ok(storage) => storage,
            Err(e) => {
                error!("Cannot open database {}: {}", self.db_path, e);
                self.set_status(Status::Error, format!("Cannot open database: {}", e));
                return;
            }
        };

        let (tx, rx) = channel();
        match self
            .session
            .start_with_adapter(&uid, adapter, self.config.poll_interval, storage, Some(tx))
        {
            Ok(AdapterKind::Live) => {
                self.events = Some(rx);
                self.set_status(Status::Success, "Connected to SmartBand");
            }
            Ok(AdapterKind::Simulated) => {
                self.events = Some(rx);
                self.set_status(Status::Info, "Device not found, showing simulated data");
            }
            Err(e) => self.set_status(Status::Error, format!("Monitoring failed: {}", e)),
        }
    }

    fn check_messages(&mut self) {
        // Collect messages first to avoid borrow issues
        let messages: Vec<UiMessage> = self.ui_rx.try_iter().collect();

        for msg in messages {
            match msg {
                UiMessage::SignedIn(user) => {
                    self.auth_busy = false;
                    self.log_in(user);
                }
                UiMessage::AuthNotice(message) => {
                    self.auth_busy = false;
                    self.auth_status = Status::Success;
                    self.auth_message = message;
                }
                UiMessage::AuthFailed(message) => {
                    self.auth_busy = false;
                    self.auth_status = Status::Error;
                    self.auth_message = message;
                }
                UiMessage::AdapterSelected(generation, adapter) => {
                    if is_current_probe(self.probe_generation, generation) {
                        self.adapter_ready(adapter);
                    } else {
                        debug!("Dropping result of superseded device probe {}", generation);
                    }
                }
            }
        }

        // The shared state already holds the data; the events only mean "redraw"
        if let Some(rx) = &self.events {
            while rx.try_recv().is_ok() {}
        }
    }

    fn refresh_history(&mut self) {
        let Some(uid) = self.user.as_ref().map(|user| user.uid.clone()) else {
            return;
        };
        let bounds = parse_day(&self.history_from, false)
            .and_then(|start| Ok((start, parse_day(&self.history_to, true)?)));
        let (start, end) = match bounds {
            Ok(bounds) => bounds,
            Err(e) => {
                self.set_status(Status::Error, e.to_string());
                return;
            }
        };

        match Storage::new(&self.db_path).and_then(|s| s.get_readings(&uid, Some(start), Some(end))) {
            Ok(readings) => self.history = readings,
            Err(e) => {
                error!("Loading history failed: {}", e);
                self.set_status(Status::Error, format!("Database error: {}", e));
            }
        }
    }

    fn export_csv(&mut self) {
        let Some(uid) = self.user.as_ref().map(|user| user.uid.clone()) else {
            return;
        };

        let default_name = default_export_name(Local::now().date_naive());
        let Some(path) = rfd::FileDialog::new()
            .add_filter("CSV", &["csv"])
            .set_directory(default_export_dir())
            .set_file_name(&default_name)
            .save_file()
        else {
            return;
        };

        let result = Storage::new(&self.db_path)
            .and_then(|storage| storage.get_readings(&uid, None, None))
            .map_err(crate::error::BioTrackError::from)
            .and_then(|readings| export_to_csv(&path, &readings));

        match result {
            Ok(count) => self.set_status(
                Status::Success,
                format!("Exported {} readings to {}", count, path.display()),
            ),
            Err(e) => self.set_status(Status::Error, format!("Export failed: {}", e)),
        }
    }

    fn save_settings(&mut self) {
        let ip = self.device_ip_draft.trim();
        self.settings_draft.device_ip = if ip.is_empty() { None } else { Some(ip.to_string()) };

        if let Err(e) = self.settings_draft.save(settings_file_path()) {
            self.set_status(Status::Error, format!("Could not save settings: {}", e));
            return;
        }

        let ip_changed = self.settings_draft.effective_device_ip(&self.config.device_ip)
            != self.settings.effective_device_ip(&self.config.device_ip);
        self.settings = self.settings_draft.clone();
        self.set_status(Status::Success, "Settings saved successfully!");

        if ip_changed {
            self.start_monitoring();
        }
    }

    fn show_login(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(80.0);
                ui.heading(APP_NAME);
                ui.label("Health Monitoring System");
                ui.add_space(30.0);

                egui::Grid::new("login_grid").num_columns(2).spacing([10.0, 8.0]).show(ui, |ui| {
                    ui.label("Email:");
                    ui.text_edit_singleline(&mut self.email);
                    ui.end_row();

                    ui.label("Password:");
                    ui.add(egui::TextEdit::singleline(&mut self.password).password(true));
                    ui.end_row();
                });

                ui.add_space(15.0);
                let online = self.config.auth_api_key.is_some() && !self.auth_busy;

                if ui.add_enabled(online, egui::Button::new("Login")).clicked() {
                    self.start_auth(AuthAction::SignIn);
                }
                if ui.add_enabled(online, egui::Button::new("Sign Up")).clicked() {
                    self.start_auth(AuthAction::SignUp);
                }
                if ui.add_enabled(online, egui::Button::new("Forgot Password?")).clicked() {
                    self.start_auth(AuthAction::ResetPassword);
                }

                ui.add_space(10.0);
                if ui.add_enabled(!self.auth_busy, egui::Button::new("Continue Offline")).clicked() {
                    self.log_in(User::offline());
                }

                if self.auth_busy {
                    ui.spinner();
                }
                if !self.auth_message.is_empty() {
                    ui.colored_label(self.auth_status.color(), &self.auth_message);
                }
            });
        });
    }

    fn show_dashboard(&mut self, ui: &mut egui::Ui) {
        let state = self.session.snapshot();

        ui.horizontal(|ui| {
            if self.probing {
                ui.spinner();
                ui.label("Connecting...");
            } else if state.connected {
                ui.colored_label(severity_color(Severity::Normal), "● Connected");
            } else {
                ui.colored_label(severity_color(Severity::Critical), "● Disconnected");
            }

            if let Some(kind) = self.session.adapter_kind() {
                ui.label(format!("({} data)", kind.label()));
            }
            if let Some(latest) = &state.latest {
                let overall = latest.overall_severity();
                ui.colored_label(severity_color(overall), format!("Overall: {}", overall.label()));
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                match state.last_update() {
                    Some(ts) => ui.label(format!("Last update: {}", ts.with_timezone(&Local).format("%H:%M:%S"))),
                    None => ui.label("Last update: --"),
                };
            });
        });

        ui.separator();

        ui.columns(3, |columns| {
            for (ui, metric) in columns.iter_mut().zip(Metric::ALL) {
                Self::show_metric_card(ui, metric, &state);
            }
        });

        ui.add_space(10.0);

        egui::ScrollArea::vertical().show(ui, |ui| {
            for metric in Metric::ALL {
                self.show_metric_chart(ui, metric, &state);
                ui.add_space(10.0);
            }
        });
    }

    fn show_metric_card(ui: &mut egui::Ui, metric: Metric, state: &LiveState) {
        ui.group(|ui| {
            ui.vertical_centered(|ui| {
                ui.label(egui::RichText::new(metric.label()).strong());
                match state.current(metric) {
                    Some((value, severity)) => {
                        ui.label(
                            egui::RichText::new(metric.format_value(value))
                                .size(32.0)
                                .color(severity_color(severity)),
                        );
                        ui.label(metric.unit_label());
                        ui.colored_label(severity_color(severity), format!("● {}", severity.label()));
                    }
                    None => {
                        ui.label(egui::RichText::new("--").size(32.0));
                        ui.label(metric.unit_label());
                    }
                }
                ui.small(format!("Normal: {}", Thresholds::for_metric(metric).format_range(metric)));
            });
        });
    }

    fn show_metric_chart(&self, ui: &mut egui::Ui, metric: Metric, state: &LiveState) {
        ui.group(|ui| {
            let buffer = state.buffers.get(metric);
            ui.horizontal(|ui| {
                ui.label(egui::RichText::new(format!("{} Trend", metric.label())).heading());
                ui.label(format!("({} points)", buffer.len()));
            });

            if buffer.is_empty() {
                ui.label("Waiting for data...");
                return;
            }
            let points = buffer.plot_points();
            let first_x = points[0][0];

            let line = Line::new(metric.label(), PlotPoints::from(points))
                .color(metric_color(metric));

            let (low, high) = self.settings.alert_lines(metric);
            let reference = |name: String, y: f64, color: egui::Color32| {
                Line::new(name, PlotPoints::from_iter([[first_x, y], [0.0, y]]))
                    .color(color)
                    .style(egui_plot::LineStyle::dashed_dense())
            };

            Plot::new(format!("{}_trend", metric.label()))
                .height(180.0)
                .show_axes(true)
                .x_axis_label("seconds")
                .legend(egui_plot::Legend::default())
                .show(ui, |plot_ui| {
                    plot_ui.line(line);
                    if let Some(y) = low {
                        plot_ui.line(reference(format!("Min ({})", y), y, egui::Color32::from_rgb(255, 100, 100)));
                    }
                    if let Some(y) = high {
                        plot_ui.line(reference(format!("Max ({})", y), y, egui::Color32::from_rgb(255, 180, 100)));
                    }
                });
        });
    }

    fn show_history(&mut self, ui: &mut egui::Ui) {
        ui.heading("History");
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("From:");
            ui.add(egui::TextEdit::singleline(&mut self.history_from).desired_width(100.0));
            ui.label("To:");
            ui.add(egui::TextEdit::singleline(&mut self.history_to).desired_width(100.0));

            if ui.button("Load Data").clicked() {
                self.refresh_history();
            }
            if ui.button("Export to CSV").clicked() {
                self.export_csv();
            }
        });

        ui.label(format!("{} readings", self.history.len()));
        ui.add_space(5.0);

        if self.history.is_empty() {
            ui.label("No readings in this range.");
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            egui::Grid::new("history_grid")
                .num_columns(4)
                .striped(true)
                .spacing([30.0, 4.0])
                .show(ui, |ui| {
                    ui.strong("Timestamp");
                    for metric in Metric::ALL {
                        ui.strong(format!("{} ({})", metric.label(), metric.unit_label()));
                    }
                    ui.end_row();

                    for sample in &self.history {
                        ui.label(sample.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string());
                        for metric in Metric::ALL {
                            ui.colored_label(
                                severity_color(sample.severity(metric)),
                                metric.format_value(sample.value(metric)),
                            );
                        }
                        ui.end_row();
                    }
                });
        });
    }

    fn show_settings(&mut self, ui: &mut egui::Ui) {
        ui.heading("Settings");
        ui.separator();

        ui.group(|ui| {
            ui.label(egui::RichText::new("Device Connection").strong());
            ui.horizontal(|ui| {
                ui.label("SmartBand IP:");
                ui.text_edit_singleline(&mut self.device_ip_draft);
            });
        });

        ui.add_space(10.0);

        ui.group(|ui| {
            ui.label(egui::RichText::new("Alert Lines").strong());
            let draft = &mut self.settings_draft;
            egui::Grid::new("alert_grid").num_columns(3).spacing([10.0, 6.0]).show(ui, |ui| {
                ui.label("");
                ui.label("Min");
                ui.label("Max");
                ui.end_row();

                ui.label("Glucose (mg/dL):");
                ui.add(egui::DragValue::new(&mut draft.glucose_min).range(0.0..=500.0));
                ui.add(egui::DragValue::new(&mut draft.glucose_max).range(0.0..=500.0));
                ui.end_row();

                ui.label("pH:");
                ui.add(egui::DragValue::new(&mut draft.ph_min).range(0.0..=14.0).speed(0.05));
                ui.add(egui::DragValue::new(&mut draft.ph_max).range(0.0..=14.0).speed(0.05));
                ui.end_row();

                ui.label("Oxygen (%):");
                ui.add(egui::DragValue::new(&mut draft.oxygen_min).range(0.0..=100.0));
                ui.label("");
                ui.end_row();
            });
        });

        ui.add_space(10.0);

        ui.horizontal(|ui| {
            if ui.button("Save Settings").clicked() {
                self.save_settings();
            }
            if ui.button("Reset to Defaults").clicked() {
                self.settings_draft = AppSettings::default();
                self.device_ip_draft = self.config.device_ip.clone();
            }
        });
    }
}

impl eframe::App for BioTrackApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.check_messages();

        if self.auth_busy || self.probing {
            ctx.request_repaint();
        } else if self.session.is_running() {
            ctx.request_repaint_after(std::time::Duration::from_millis(500));
        }

        let Some(user) = self.user.clone() else {
            self.show_login(ctx);
            return;
        };

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading(APP_NAME);

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if ui.button("Logout").clicked() {
                        self.log_out();
                    }

                    let who = if user.email.is_empty() { "offline" } else { user.email.as_str() };
                    ui.label(format!("{} (since {})", who, user.login_time.format("%H:%M")));

                    if !self.status_message.is_empty() {
                        ui.colored_label(self.status.color(), &self.status_message);
                    }
                });
            });

            ui.separator();

            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.current_tab, Tab::Dashboard, "Dashboard");
                ui.selectable_value(&mut self.current_tab, Tab::History, "History");
                ui.selectable_value(&mut self.current_tab, Tab::Settings, "Settings");
            });
        });

        if self.user.is_none() {
            return;
        }

        egui::CentralPanel::default().show(ctx, |ui| match self.current_tab {
            Tab::Dashboard => self.show_dashboard(ui),
            Tab::History => self.show_history(ui),
            Tab::Settings => self.show_settings(ui),
        });
    }
}

/// Run the GUI application
pub fn run_gui(config: Config) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_min_inner_size([800.0, 600.0])
            .with_transparent(false),
        vsync: true,
        multisampling: 0,
        depth_buffer: 0,
        ..Default::default()
    };

    eframe::run_native(
        APP_NAME,
        options,
        Box::new(move |cc| Ok(Box::new(BioTrackApp::new(cc, config)))),
    )
}
