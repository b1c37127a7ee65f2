use crate::{
    controller::{ClickerSettings, Controller, Notice, Role, TimeUnit, TyperSettings},
    error::ConfigError,
    keys::Key,
    prefs::{Preferences, PrefsStore},
    signal::Waker,
    startup,
    worker::{FinishReason, Ports},
};
use eframe::egui::{self, Color32, RichText};
use std::sync::Arc;

const LEGAL_NOTICE: &str = "Using auto clickers and auto typers may violate the Terms of Service of many:\n\n\
    • Online games\n• Applications\n• Websites\n• Services\n\n\
    Violations may result in:\n\
    • Account bans\n• Loss of progress/data\n• Legal action in some cases\n\n\
    USE AT YOUR OWN RISK. You are solely responsible for any consequences.\n\n\
    By clicking 'I Understand', you acknowledge you have read and accept these risks. \
    You can turn this warning off in Settings.";

const TYPER_WARNING: &str = "⚠ WARNING ⚠\n\nHIGH CHANCE THIS TRIGGERS YOUR ANTI-VIRUS AND FLAGS THIS AS \"jokeware\",\n\
    ONLY RUN IF YOU THINK OTHERWISE!";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tab { Clicker, Typer }

enum Dialog {
    LegalWarning,
    Settings { ignore_warnings: bool },
    ConfirmHotkey(Key),
    ConfirmStartup,
    Message { title: &'static str, body: String },
}

pub struct AutoClickerApp {
    controller: Controller,
    tab: Tab,
    clicker: ClickerSettings,
    typer: TyperSettings,
    hotkey_input: String,
    add_to_startup: bool,
    dialog: Option<Dialog>,
}

impl AutoClickerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, ports: Ports, store: Box<dyn PrefsStore>) -> Self {
        let ctx = cc.egui_ctx.clone();
        let waker: Waker = Arc::new(move || ctx.request_repaint());
        let controller = Controller::new(ports, store, Some(waker));
        let prefs = controller.preferences();
        apply_theme(&cc.egui_ctx, prefs.dark_mode);

        Self {
            controller,
            tab: Tab::Clicker,
            clicker: ClickerSettings::default(),
            typer: TyperSettings::default(),
            hotkey_input: String::new(),
            add_to_startup: false,
            dialog: (!prefs.suppress_legal_warning).then_some(Dialog::LegalWarning),
        }
    }

    fn show_error(&mut self, e: ConfigError) {
        self.dialog = Some(Dialog::Message { title: "Error", body: e.to_string() });
    }

    fn handle_notices(&mut self) {
        for notice in self.controller.poll() {
            match notice {
                Notice::HotkeyPressed => {
                    if let Err(e) = self.controller.start_clicker(&self.clicker) { self.show_error(e); }
                }
                Notice::Finished(role, FinishReason::PortFailure) => {
                    let what = match role { Role::Clicker => "Auto clicker", Role::Typer => "Auto typer" };
                    self.dialog = Some(Dialog::Message {
                        title: "Error",
                        body: format!("{what} stopped: the input device stopped responding."),
                    });
                }
                _ => {}
            }
        }
    }

    fn hotkey_edited(&mut self) {
        if self.hotkey_input.is_empty() {
            self.controller.set_hotkey(None);
            return;
        }
        match Key::parse(&self.hotkey_input) {
            Ok(key) if key.is_common() => self.dialog = Some(Dialog::ConfirmHotkey(key)),
            Ok(key) => self.controller.set_hotkey(Some(key)),
            Err(e) => {
                self.hotkey_input.clear();
                self.controller.set_hotkey(None);
                self.show_error(e);
            }
        }
    }

    fn set_preferences(&mut self, ctx: &egui::Context, prefs: Preferences) {
        apply_theme(ctx, prefs.dark_mode);
        self.controller.set_preferences(prefs);
    }

    fn clicker_tab(&mut self, ui: &mut egui::Ui) {
        ui.heading("Auto Clicker");
        ui.add_space(12.0);

        ui.horizontal(|ui| {
            ui.label("Clicks per:");
            ui.add(egui::DragValue::new(&mut self.clicker.interval).clamp_range(1..=10_000));
            egui::ComboBox::from_id_source("click_unit")
                .selected_text(self.clicker.unit.label())
                .show_ui(ui, |ui| {
                    for unit in [TimeUnit::Milliseconds, TimeUnit::Seconds, TimeUnit::Minutes] {
                        ui.selectable_value(&mut self.clicker.unit, unit, unit.label());
                    }
                });
        });

        ui.horizontal(|ui| {
            ui.label("Button to auto turn on:");
            let edit = egui::TextEdit::singleline(&mut self.hotkey_input)
                .char_limit(1)
                .desired_width(40.0)
                .hint_text("key");
            if ui.add(edit).changed() { self.hotkey_edited(); }
        });

        ui.horizontal(|ui| {
            ui.label("Emergency STOP button:");
            ui.add(
                egui::TextEdit::singleline(&mut self.clicker.stop_key)
                    .char_limit(1)
                    .desired_width(40.0)
                    .hint_text("q"),
            );
            ui.label(RichText::new("(THIS IS IMPORTANT!!!)").color(Color32::RED).strong());
        });

        let folder = startup::startup_folder()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "the startup folder".to_string());
        if ui.checkbox(&mut self.add_to_startup, format!("Add to Startup Folder at {folder}?")).changed()
            && self.add_to_startup
        {
            self.dialog = Some(Dialog::ConfirmStartup);
        }

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label("Turn On or Off:");
            let status = self.controller.status(Role::Clicker);
            let mut on = status.is_on();
            if ui.toggle_value(&mut on, RichText::new(status.to_string()).strong()).clicked() {
                if let Err(e) = self.controller.toggle_clicker(on, &self.clicker) { self.show_error(e); }
            }
        });
        ui.label(format!("Status: {}", self.controller.worker_state(Role::Clicker)));

        ui.add_space(12.0);
        let mut prefs = self.controller.preferences();
        if ui.checkbox(&mut prefs.dark_mode, "Dark mode").changed() {
            self.set_preferences(ui.ctx(), prefs);
        }
    }

    fn typer_tab(&mut self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .stroke(egui::Stroke::new(2.0, Color32::RED))
            .rounding(5.0)
            .inner_margin(10.0)
            .show(ui, |ui| {
                ui.vertical_centered(|ui| {
                    ui.label(RichText::new(TYPER_WARNING).color(Color32::RED).strong().size(16.0));
                });
            });
        ui.add_space(12.0);

        ui.horizontal(|ui| {
            ui.label("Type per:");
            ui.add(egui::DragValue::new(&mut self.typer.interval).speed(0.1).clamp_range(0.1..=10_000.0));
            egui::ComboBox::from_id_source("type_unit")
                .selected_text(self.typer.unit.label())
                .show_ui(ui, |ui| {
                    for unit in [TimeUnit::Seconds, TimeUnit::Minutes] {
                        ui.selectable_value(&mut self.typer.unit, unit, unit.label());
                    }
                });
        });

        ui.horizontal(|ui| {
            ui.label("For (seconds; optional):");
            ui.add(
                egui::DragValue::new(&mut self.typer.duration_secs)
                    .clamp_range(0..=3600)
                    .custom_formatter(|v, _| if v == 0.0 { "Unlimited".into() } else { format!("{v}") }),
            );
        });

        ui.label("What to type:");
        ui.add(egui::TextEdit::singleline(&mut self.typer.text).hint_text("Enter text to type..."));

        ui.add_space(12.0);
        ui.horizontal(|ui| {
            ui.label("Turn On or Off:");
            let status = self.controller.status(Role::Typer);
            let mut on = status.is_on();
            if ui.toggle_value(&mut on, RichText::new(status.to_string()).strong()).clicked() {
                if let Err(e) = self.controller.toggle_typer(on, &self.typer) { self.show_error(e); }
            }
        });
        ui.label(format!("Status: {}", self.controller.worker_state(Role::Typer)));
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(mut dialog) = self.dialog.take() else { return };
        let mut open = true;

        let title = match &dialog {
            Dialog::LegalWarning => "Terms of Service Warning",
            Dialog::Settings { .. } => "Settings",
            Dialog::ConfirmHotkey(_) => "Confirm Hotkey",
            Dialog::ConfirmStartup => "Confirm Startup",
            Dialog::Message { title, .. } => *title,
        };

        egui::Window::new(title)
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, egui::Vec2::ZERO)
            .show(ctx, |ui| match &mut dialog {
                Dialog::LegalWarning => {
                    ui.label(RichText::new("⚠ IMPORTANT LEGAL NOTICE ⚠").strong().size(16.0));
                    ui.label(LEGAL_NOTICE);
                    ui.horizontal(|ui| {
                        if ui.button("I Understand").clicked() { open = false; }
                        if ui.button("Exit").clicked() {
                            ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                            open = false;
                        }
                    });
                }
                Dialog::Settings { ignore_warnings } => {
                    ui.checkbox(ignore_warnings, "Ignore ToS Violation Warnings");
                    ui.horizontal(|ui| {
                        if ui.button("OK").clicked() {
                            let prefs = Preferences {
                                suppress_legal_warning: *ignore_warnings,
                                ..self.controller.preferences()
                            };
                            self.set_preferences(ctx, prefs);
                            open = false;
                        }
                        if ui.button("Cancel").clicked() { open = false; }
                    });
                }
                Dialog::ConfirmHotkey(key) => {
                    ui.label(format!(
                        "Are you SURE you want to use '{key}' as your hotkey?\n\n\
                         This is a commonly used key and may interfere with normal typing/usage."
                    ));
                    ui.horizontal(|ui| {
                        if ui.button("Yes").clicked() {
                            self.controller.set_hotkey(Some(*key));
                            open = false;
                        }
                        if ui.button("No").clicked() {
                            self.hotkey_input.clear();
                            self.controller.set_hotkey(None);
                            open = false;
                        }
                    });
                }
                Dialog::ConfirmStartup => {
                    ui.label(
                        "Are you SURE you want to add this to your Startup Folder?\n\
                         It will run every time you turn your device on.",
                    );
                    ui.horizontal(|ui| {
                        if ui.button("Yes").clicked() {
                            open = false;
                            self.install_startup();
                        }
                        if ui.button("No").clicked() {
                            self.add_to_startup = false;
                            open = false;
                        }
                    });
                }
                Dialog::Message { body, .. } => {
                    ui.label(body.as_str());
                    if ui.button("OK").clicked() { open = false; }
                }
            });

        // Actions above may have queued a follow-up dialog.
        if open && self.dialog.is_none() { self.dialog = Some(dialog); }
    }

    fn install_startup(&mut self) {
        let result = std::env::current_exe()
            .map_err(startup::StartupError::from)
            .and_then(|exe| startup::install(&exe));
        self.dialog = Some(match result {
            Ok(_) => Dialog::Message { title: "Success", body: "Added to startup!".into() },
            Err(e) => {
                tracing::warn!("startup install failed: {e}");
                self.add_to_startup = false;
                Dialog::Message { title: "Error", body: e.to_string() }
            }
        });
    }
}

impl eframe::App for AutoClickerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_notices();
        let modal = self.dialog.is_some();

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.add_enabled_ui(!modal, |ui| {
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.tab, Tab::Clicker, "Auto Clicker");
                    ui.selectable_value(&mut self.tab, Tab::Typer, "Auto Typer");
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        if ui.button("⚙ Settings").clicked() {
                            let ignore_warnings = self.controller.preferences().suppress_legal_warning;
                            self.dialog = Some(Dialog::Settings { ignore_warnings });
                        }
                    });
                });
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_enabled_ui(!modal, |ui| match self.tab {
                Tab::Clicker => self.clicker_tab(ui),
                Tab::Typer => self.typer_tab(ui),
            });
        });

        self.show_dialog(ctx);
    }
}

fn apply_theme(ctx: &egui::Context, dark: bool) {
    ctx.set_visuals(if dark { egui::Visuals::dark() } else { egui::Visuals::light() });
}
