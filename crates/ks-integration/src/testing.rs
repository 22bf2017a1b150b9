//! Shared test doubles

use crate::engine::{AuxStage, EngineApi};
use ks_core::{CallbackHandle, VideoMode};
use std::cell::{Cell, RefCell};
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Records every call; gate results are configurable
#[derive(Default)]
pub(crate) struct Recorder {
    pub(crate) calls: RefCell<Vec<String>>,
    pub(crate) fail_requirements: bool,
    pub(crate) fail_screen_mode: bool,
    pub(crate) fail_graphics: bool,
    pub(crate) fail_renderer: bool,
    pub(crate) render_keyword: Cell<Option<u32>>,
    pub(crate) callback: Option<CallbackHandle>,
}

impl Recorder {
    pub(crate) fn log(&self, call: &str) {
        self.calls.borrow_mut().push(call.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == call).count()
    }
}

impl EngineApi for Recorder {
    fn init_audio(&self) {
        self.log("init_audio")
    }
    fn enable_sound(&self) {
        self.log("enable_sound")
    }
    fn init_aux(&self, stage: AuxStage) {
        self.log(&format!("init_aux {:?}", stage))
    }
    fn validate_requirements(&self) -> bool {
        self.log("validate_requirements");
        !self.fail_requirements
    }
    fn default_screen_mode(&self) -> bool {
        self.log("default_screen_mode");
        !self.fail_screen_mode
    }
    fn init_graphics(&self, _mode: VideoMode, _windowed: bool) -> bool {
        self.log("init_graphics");
        !self.fail_graphics
    }
    fn init_renderer(&self, _windowed: bool, render_keyword: u32) -> bool {
        self.log("init_renderer");
        self.render_keyword.set(Some(render_keyword));
        !self.fail_renderer
    }
    fn prepare_graphics_shutdown(&self) {
        self.log("prepare_graphics_shutdown")
    }
    fn shutdown_graphics(&self) {
        self.log("shutdown_graphics")
    }
    fn init_menu(&self) {
        self.log("init_menu")
    }
    fn cleanup_menu(&self) {
        self.log("cleanup_menu")
    }
    fn set_framerate_lock(&self, enabled: bool) {
        self.log(&format!("set_framerate_lock {}", enabled))
    }
    fn set_fps_display(&self, mode: i32) {
        self.log(&format!("set_fps_display {}", mode))
    }
    fn apply_gamma(&self) {
        self.log("apply_gamma")
    }
    fn enable_wide_aspect(&self) {
        self.log("enable_wide_aspect")
    }
    fn shutdown_aux(&self, stage: AuxStage) {
        self.log(&format!("shutdown_aux {:?}", stage))
    }
    fn callback_interface(&self) -> Option<CallbackHandle> {
        self.callback
    }
}

/// Shared in-memory writer
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub(crate) fn contents(&self) -> String {
        self.0
            .lock()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber capturing warnings and above as plain text
pub(crate) fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();

    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer.contents())
}
