//! A minimal window that displays a stream of images.
//!
//! The windowing event loop has to run on the main thread, so [`run`] takes over the main thread
//! and runs the application on a separate one. Application code talks to the event loop through
//! [`Window`] handles, which forward images and receive input events over channels.

mod renderer;

use std::{
    collections::{HashMap, HashSet},
    panic::{catch_unwind, AssertUnwindSafe},
    process,
    rc::Rc,
    sync::Mutex,
};

use anyhow::anyhow;
use crossbeam_channel::{Receiver, Sender};
use once_cell::sync::OnceCell;
use winit::{
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::WindowId,
};

use crate::{
    image::{Image, Resolution},
    termination::Termination,
};

use self::renderer::{Gpu, Renderer};

/// User input delivered to a [`Window`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Escape or `Q` was pressed while the window had focus.
    Quit,
    /// The window was closed by the user.
    Closed,
}

impl InputEvent {
    fn from_key(key: VirtualKeyCode) -> Option<Self> {
        match key {
            VirtualKeyCode::Escape | VirtualKeyCode::Q => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Msg {
    Open {
        key: String,
        events: Sender<InputEvent>,
    },
    Image {
        key: String,
        res: Resolution,
        data: Vec<u8>,
    },
}

struct Gui {
    gpu: Rc<Gpu>,
    windows: HashMap<String, Renderer>,
    win_id_to_key: HashMap<WindowId, String>,
    listeners: HashMap<String, Sender<InputEvent>>,
    /// Windows closed by the user. These are never opened again.
    closed: HashSet<String>,
}

impl Gui {
    fn new(gpu: Gpu) -> Self {
        Self {
            gpu: Rc::new(gpu),
            windows: HashMap::new(),
            win_id_to_key: HashMap::new(),
            listeners: HashMap::new(),
            closed: HashSet::new(),
        }
    }

    fn run(mut self, event_loop: EventLoop<Msg>) -> ! {
        event_loop.run(move |event, target, flow| {
            *flow = ControlFlow::Wait;
            let result = match event {
                Event::UserEvent(msg) => self.handle_msg(msg, target),
                Event::WindowEvent { window_id, event } => {
                    self.handle_window_event(window_id, event);
                    Ok(())
                }
                Event::RedrawRequested(window_id) => match self.renderer_mut(window_id) {
                    Some(renderer) => renderer.redraw(),
                    None => Ok(()),
                },
                _ => Ok(()),
            };

            if let Err(e) = result {
                eprintln!("Error: {e:?}");
                process::exit(1);
            }
        })
    }

    fn renderer_mut(&mut self, win: WindowId) -> Option<&mut Renderer> {
        let key = self.win_id_to_key.get(&win)?;
        self.windows.get_mut(key)
    }

    fn handle_msg(&mut self, msg: Msg, target: &EventLoopWindowTarget<Msg>) -> anyhow::Result<()> {
        match msg {
            Msg::Open { key, events } => {
                self.listeners.insert(key, events);
            }
            Msg::Image { key, res, data } => {
                if self.closed.contains(&key) {
                    return Ok(());
                }

                if !self.windows.contains_key(&key) {
                    log::debug!("creating window '{key}' at {res}");

                    let win = renderer::Window::open(target, &key, res)?;
                    let win_id = win.win.id();
                    let renderer = Renderer::new(win, self.gpu.clone())?;
                    self.win_id_to_key.insert(win_id, key.clone());
                    self.windows.insert(key.clone(), renderer);
                }

                if let Some(renderer) = self.windows.get_mut(&key) {
                    renderer.update_texture(res, &data);
                    renderer.window().request_redraw();
                }
            }
        }
        Ok(())
    }

    fn handle_window_event(&mut self, window_id: WindowId, event: WindowEvent<'_>) {
        let Some(key) = self.win_id_to_key.get(&window_id).cloned() else {
            return;
        };

        let input = match event {
            WindowEvent::CloseRequested => {
                log::debug!("window '{key}' closed");
                self.win_id_to_key.remove(&window_id);
                self.windows.remove(&key);
                self.closed.insert(key.clone());
                Some(InputEvent::Closed)
            }
            WindowEvent::KeyboardInput {
                input:
                    KeyboardInput {
                        state: ElementState::Pressed,
                        virtual_keycode: Some(keycode),
                        ..
                    },
                ..
            } => InputEvent::from_key(keycode),
            _ => None,
        };

        if let (Some(input), Some(listener)) = (input, self.listeners.get(&key)) {
            // The application may have dropped its `Window` already.
            listener.send(input).ok();
        }
    }
}

static PROXY: OnceCell<Mutex<EventLoopProxy<Msg>>> = OnceCell::new();

fn send(msg: Msg) -> anyhow::Result<()> {
    let proxy = PROXY
        .get()
        .ok_or_else(|| anyhow!("GUI is not running (use `gui::run`)"))?;
    proxy
        .lock()
        .map_err(|_| anyhow!("GUI event loop proxy is poisoned"))?
        .send_event(msg)
        .map_err(|_closed| anyhow!("GUI event loop has exited"))
}

/// Runs `app` on a background thread while the main thread drives the windowing event loop.
///
/// This function never returns. The process exits once `app` finishes: with status 0 if it
/// succeeded, 1 if it returned an error (which is printed), and 101 if it panicked.
pub fn run<F, R>(app: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    let event_loop = EventLoopBuilder::with_user_event().build();
    if PROXY.set(Mutex::new(event_loop.create_proxy())).is_err() {
        eprintln!("Error: GUI is already running");
        process::exit(1);
    }

    let gpu = match pollster::block_on(Gpu::open()) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("Error: {e:?}");
            process::exit(1);
        }
    };

    std::thread::spawn(move || {
        let result = catch_unwind(AssertUnwindSafe(app));
        match result {
            Ok(r) => {
                if r.is_success() {
                    process::exit(0);
                } else {
                    r.report(); // prints the error message
                    process::exit(1);
                }
            }
            Err(_payload) => {
                // The panic hook has printed the message already. 101 matches libstd.
                process::exit(101);
            }
        }
    });

    Gui::new(gpu).run(event_loop)
}

/// Handle to a window, usable from the application thread.
///
/// The native window is created when the first image is shown. Once the user closes it, it
/// stays closed and further images are discarded.
pub struct Window {
    key: String,
    events: Receiver<InputEvent>,
    closed: bool,
}

impl Window {
    /// Registers a window with the given title.
    ///
    /// Fails if the GUI is not running.
    pub fn open(title: impl Into<String>) -> anyhow::Result<Self> {
        let key = title.into();
        let (tx, rx) = crossbeam_channel::unbounded();
        send(Msg::Open {
            key: key.clone(),
            events: tx,
        })?;
        Ok(Self {
            key,
            events: rx,
            closed: false,
        })
    }

    /// Displays `image` in this window.
    pub fn show(&mut self, image: &Image) -> anyhow::Result<()> {
        if self.closed {
            return Ok(());
        }

        // Image data is RGBA8 internally so that no conversion before GPU upload is needed.
        send(Msg::Image {
            key: self.key.clone(),
            res: image.resolution(),
            data: image.data().to_vec(),
        })
    }

    /// Returns the next pending input event, if any.
    pub fn poll_event(&mut self) -> Option<InputEvent> {
        let event = self.events.try_recv().ok()?;
        if event == InputEvent::Closed {
            self.closed = true;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_keys() {
        assert_eq!(
            InputEvent::from_key(VirtualKeyCode::Escape),
            Some(InputEvent::Quit)
        );
        assert_eq!(
            InputEvent::from_key(VirtualKeyCode::Q),
            Some(InputEvent::Quit)
        );
        assert_eq!(InputEvent::from_key(VirtualKeyCode::W), None);
    }

    #[test]
    fn open_without_event_loop() {
        assert!(Window::open("test").is_err());
    }
}
