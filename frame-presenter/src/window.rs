//! `winit` window as a presentation surface.

use crate::config::WindowConfig;
use crate::device::WindowSurface;
use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::cell::{Cell, RefCell};
use winit::{
    dpi::LogicalSize,
    event::{Event, StartCause, WindowEvent},
    event_loop::EventLoop,
    platform::run_return::EventLoopExtRunReturn,
    window::{Window, WindowBuilder},
};

/// Window events the frame loop cares about, accumulated between pumps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowSignals {
    pub resized: bool,
    pub close_requested: bool,
}

pub struct WinitSurface {
    window: Window,
    event_loop: RefCell<EventLoop<()>>,
    signals: Cell<WindowSignals>,
}

impl WinitSurface {
    pub fn new(config: &WindowConfig) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(LogicalSize::new(f64::from(config.width), f64::from(config.height)))
            .build(&event_loop)?;
        tracing::info!("Window created: {}x{} \"{}\".", config.width, config.height, config.title);

        Ok(Self {
            window,
            event_loop: RefCell::new(event_loop),
            signals: Cell::new(WindowSignals::default()),
        })
    }

    /// Drains pending window events without blocking and returns what
    /// happened since the last call.
    pub fn pump_events(&self) -> WindowSignals {
        self.event_loop.borrow_mut().run_return(|event, _, control_flow| {
            control_flow.set_poll();
            match event {
                Event::WindowEvent { event, .. } => self.note(&event),
                Event::MainEventsCleared => control_flow.set_exit(),
                _ => (),
            }
        });
        self.signals.take()
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    fn note(&self, event: &WindowEvent<'_>) {
        let mut signals = self.signals.get();
        match event {
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => signals.resized = true,
            WindowEvent::CloseRequested => signals.close_requested = true,
            _ => return,
        }
        self.signals.set(signals);
    }
}

impl WindowSurface for WinitSurface {
    fn raw_display_handle(&self) -> RawDisplayHandle {
        self.window.raw_display_handle()
    }

    fn raw_window_handle(&self) -> RawWindowHandle {
        self.window.raw_window_handle()
    }

    fn drawable_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    /// Sleeps until at least one new event arrives, then returns once it has
    /// been dispatched. Signals seen here are reported by the next pump.
    fn wait_events(&self) {
        let mut woken = false;
        self.event_loop.borrow_mut().run_return(|event, _, control_flow| {
            control_flow.set_wait();
            match event {
                Event::NewEvents(StartCause::Init) => (),
                Event::NewEvents(_) => woken = true,
                Event::WindowEvent { event, .. } => self.note(&event),
                Event::MainEventsCleared if woken => control_flow.set_exit(),
                _ => (),
            }
        });
    }

    /// Reports a close seen by `wait_events` that no pump has taken yet.
    fn close_requested(&self) -> bool {
        self.signals.get().close_requested
    }
}
