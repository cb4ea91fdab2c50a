use std::sync::{Arc, Mutex};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};
use glam::Vec2;

#[cfg(target_arch = "wasm32")]
use winit::event_loop::EventLoopProxy;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use once_cell::sync::OnceCell;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::future_to_promise;
#[cfg(target_arch = "wasm32")]
use js_sys::Promise;

mod app_state;
mod assets;
mod camera;
mod models;
mod scene;
mod ui_events;

use app_state::State;
use ui_events::UserCommand;
#[cfg(target_arch = "wasm32")]
use scene::layout::ClusterSpec;

#[cfg(target_arch = "wasm32")]
static WASM_API_INSTANCE: OnceCell<WasmApi> = OnceCell::new();

#[cfg(target_arch = "wasm32")]
static WASM_READY_FLUME_CHANNEL: OnceCell<(flume::Sender<()>, flume::Receiver<()>)> = OnceCell::new();

struct App {
    window: Option<Arc<Window>>,
    state: Arc<Mutex<Option<State>>>, // Interior mutability; State is created asynchronously on wasm
    #[cfg(target_arch = "wasm32")]
    proxy: Option<EventLoopProxy<UserCommand>>,
}

impl App {
    fn new(#[cfg(target_arch = "wasm32")] event_loop: &EventLoop<UserCommand>) -> Self {
        #[cfg(target_arch = "wasm32")]
        let app_proxy = event_loop.create_proxy();

        #[cfg(target_arch = "wasm32")]
        {
            let wasm_api_instance = WasmApi { proxy: app_proxy.clone() };
            if WASM_API_INSTANCE.set(wasm_api_instance).is_err() {
                log::warn!("WASM_API_INSTANCE was already set. This should only happen once.");
            }
        }

        Self {
            window: None,
            state: Arc::new(Mutex::new(None)),
            #[cfg(target_arch = "wasm32")]
            proxy: Some(app_proxy),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn get_window_size(&self) -> Option<winit::dpi::PhysicalSize<u32>> {
        self.window.as_ref().map(|w| w.inner_size())
    }
}

impl ApplicationHandler<UserCommand> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window_attributes = Window::default_attributes()
            .with_title("FleetView Network Scene");

        #[cfg(target_arch = "wasm32")]
        let window_attributes = {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let window = wgpu::web_sys::window().unwrap_throw();
            let document = window.document().unwrap_throw();
            let canvas = document.get_element_by_id(CANVAS_ID).unwrap_throw();
            let html_canvas_element = canvas.unchecked_into();
            window_attributes.with_canvas(Some(html_canvas_element))
        };

        let window = Arc::new(event_loop.create_window(window_attributes).unwrap());
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            let mut state = pollster::block_on(State::new(window)).unwrap();
            let current_size = self.get_window_size().unwrap();
            state.resize(current_size.width, current_size.height);
            self.state.lock().unwrap().replace(state);
            self.window.as_ref().unwrap().request_redraw();
        }

        #[cfg(target_arch = "wasm32")]
        {
            let state_arc_for_spawn = self.state.clone();
            let window_for_state_new = window.clone();
            let proxy_for_init_notification = self.proxy.as_ref().expect("App proxy not set").clone();

            wasm_bindgen_futures::spawn_local(async move {
                match State::new(window_for_state_new.clone()).await {
                    Ok(mut state_instance) => {
                        log::info!("WASM State created in async task.");
                        let initial_size = window_for_state_new.inner_size();
                        state_instance.resize(initial_size.width, initial_size.height);

                        {
                            let mut app_state_guard = state_arc_for_spawn.lock().unwrap();
                            app_state_guard.replace(state_instance);
                        }
                        log::info!("WASM State assigned to App. Sending initialization notification.");
                        if proxy_for_init_notification.send_event(UserCommand::StateInitialized).is_err() {
                            log::error!("Failed to send StateInitialized event.");
                        }
                    },
                    Err(e) => log::error!("Failed to create State in WASM: {:?}", e),
                }
            });
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: UserCommand) {
        match event {
            UserCommand::StateInitialized => {
                log::info!("WASM State initialized and ready.");
                #[cfg(target_arch = "wasm32")]
                if let Some((sender, _)) = WASM_READY_FLUME_CHANNEL.get() {
                    if let Err(e) = sender.send(()) {
                        log::error!("Failed to send WASM ready signal: {:?}", e);
                    }
                }
                if let Some(w_handle) = self.window.as_ref() {
                    w_handle.request_redraw();
                }
            }
            _ => {
                if let Some(state) = &mut *self.state.lock().unwrap() {
                    state.process_command(event);
                    if let Some(w_handle) = self.window.as_ref() {
                        w_handle.request_redraw();
                    }
                } else {
                    log::warn!("Received a command before state was initialized (via proxy). Ignoring: {:?}", event);
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut *self.state.lock().unwrap() else {
            log::warn!("Window event received before State was initialized, ignoring.");
            return;
        };

        let window_handle = self.window.as_ref().unwrap();

        let mut needs_redraw = false;

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                state.resize(size.width, size.height);
                needs_redraw = true;
            }
            WindowEvent::RedrawRequested => {
                state.update();
                match state.render() {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => state.resize(state.config.width, state.config.height),
                    Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                    Err(e) => log::error!("{:?}", e),
                }
                // The idle float never settles, so keep the frames coming
                needs_redraw = true;
            }
            WindowEvent::MouseInput { state: mouse_button_state, button, .. } => {
                match (button, mouse_button_state.is_pressed()) {
                    (MouseButton::Left, true) => {
                        needs_redraw = state.pointer_pressed();
                    }
                    (MouseButton::Left, false) => {
                        state.pointer_released();
                        needs_redraw = true;
                    }
                    _ => {}
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                let screen_pos = Vec2::new(position.x as f32, position.y as f32);
                needs_redraw = state.pointer_moved(screen_pos);
            },
            _ => {}
        }

        if needs_redraw {
            window_handle.request_redraw();
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        env_logger::init();
    }
    #[cfg(target_arch = "wasm32")]
    {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).unwrap_throw();
        log::info!("Starting FleetView scene.");
        let (sender, receiver) = flume::unbounded();
        WASM_READY_FLUME_CHANNEL.set((sender, receiver))
            .expect("Failed to initialize WASM_READY_CHANNEL. This should not happen.");
        log::info!("WASM ready channel created and stored.");
    }

    let event_loop = EventLoop::with_user_event().build()?;
    let mut app = App::new(
        #[cfg(target_arch = "wasm32")]
        &event_loop,
    );
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), wasm_bindgen::JsValue> {
    log::info!("WASM started: Calling run().");
    run().unwrap_throw();

    Ok(())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
#[derive(Clone, Debug)]
pub struct WasmApi {
    proxy: EventLoopProxy<UserCommand>,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl WasmApi {
    /// Lets the host page replace the built-in cluster table, e.g. to thin
    /// the scene out on small screens.
    #[wasm_bindgen(js_name = setLayout)]
    pub fn set_layout(&self, layout_json: &str) -> Result<(), JsValue> {
        let clusters: Vec<ClusterSpec> = serde_json::from_str(layout_json)
            .map_err(|e| JsValue::from_str(&format!("JSON parsing error: {}", e)))?;

        log::info!("Received SetLayout command from JS.");

        if self.proxy.send_event(UserCommand::SetLayout { clusters }).is_err() {
            return Err(JsValue::from_str("Failed to send command to event loop."));
        }
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmApi)]
pub fn get_wasm_api() -> Result<WasmApi, JsValue> {
    WASM_API_INSTANCE.get()
        .cloned()
        .ok_or_else(|| JsValue::from_str("WasmApi is not initialized. Call run_web() first."))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getWasmReadyPromise)]
pub fn get_wasm_ready_promise() -> Result<Promise, JsValue> {
    let (_, receiver) = WASM_READY_FLUME_CHANNEL.get()
        .ok_or_else(|| JsValue::from_str("WASM ready channel not initialized. Call run_web() first."))?;

    let ready_promise = future_to_promise(async move {
        receiver.recv_async().await.unwrap_throw();
        Ok(JsValue::NULL)
    });

    Ok(ready_promise)
}
