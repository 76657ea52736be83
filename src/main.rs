// main.rs — 360° 全景视频查看器：窗口、事件循环与输入分发

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

mod camera;
mod config;
mod controls;
mod error;
mod mesh;
mod renderer;
mod scene;
mod video;
mod viewer;

use config::ViewerConfig;
use controls::PointerButton;
use error::Result;
use renderer::Renderer;
use video::{FrameSlot, Playback, PlaybackOptions};
use viewer::{Container, Frame, FrameScheduler, Viewer};

use std::path::Path;
use std::sync::Arc;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

/// 窗口客户区就是渲染画布的容器
struct WindowContainer(Arc<Window>);

impl Container for WindowContainer {
    fn layout_size(&self) -> (u32, u32) {
        let size = self.0.inner_size();
        (size.width, size.height)
    }
}

/// 通过 request_redraw 预约下一帧
struct RedrawScheduler(Arc<Window>);

impl FrameScheduler for RedrawScheduler {
    fn request_frame(&mut self) {
        self.0.request_redraw();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn open_playback(path: &Path, config: &ViewerConfig, max_dimension: u32, slot: &FrameSlot) -> Option<Playback> {
    let options = PlaybackOptions {
        frame_rate: config.playback.frame_rate,
        looping: config.playback.looping,
        max_dimension,
    };
    // 视频源打不开时不中断：球面保持空白
    match Playback::open(path, options, slot.clone()) {
        Ok(p) => Some(p),
        Err(e) => {
            log::warn!("{e}");
            None
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = ViewerConfig::load(&args)?;

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(config.window_size[0], config.window_size[1]))
            .build(&event_loop)?,
    );

    let renderer = pollster::block_on(Renderer::new(window.clone()))?;
    let max_dimension = renderer.max_texture_dimension();

    let frames = FrameSlot::new();
    let mut playback = config
        .playback
        .source
        .as_deref()
        .and_then(|path| open_playback(path, &config, max_dimension, &frames));
    if playback.is_none() {
        log::warn!("no video source loaded; press O or drop a file/folder onto the window");
    }

    let mut viewer = Viewer::new(&config, renderer, WindowContainer(window.clone()), frames.clone());
    viewer.hud.source = playback.as_ref().map(|p| p.source().display().to_string());
    let stop = viewer.stop_token();
    let mut scheduler = RedrawScheduler(window.clone());
    let mut cursor = [0.0f32; 2];

    // 启动循环
    window.request_redraw();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        let mut load_source = |path: &Path, viewer: &mut Viewer<Renderer, WindowContainer>| {
            // 先停掉旧的解码线程，再往同一个槽位写新视频
            drop(playback.take());
            playback = open_playback(path, &config, max_dimension, &frames);
            viewer.hud.source = playback.as_ref().map(|p| p.source().display().to_string());
        };

        match event {
            Event::WindowEvent { event, .. } => {
                if viewer.renderer_mut().handle_window_event(&event) {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => stop.stop(),

                    WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => viewer.resize(),

                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::Escape) => stop.stop(),
                            Some(VirtualKeyCode::O) => {
                                if let Some(path) = rfd::FileDialog::new()
                                    .add_filter("Equirectangular frames", &["jpg", "jpeg", "png", "bmp"])
                                    .pick_file()
                                {
                                    load_source(&path, &mut viewer);
                                }
                            }
                            // 帧序列目录
                            Some(VirtualKeyCode::D) => {
                                if let Some(dir) = rfd::FileDialog::new().pick_folder() {
                                    load_source(&dir, &mut viewer);
                                }
                            }
                            Some(VirtualKeyCode::F1) => viewer.hud.visible = !viewer.hud.visible,
                            Some(VirtualKeyCode::F11) => {
                                if window.fullscreen().is_some() {
                                    window.set_fullscreen(None);
                                } else {
                                    window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                                }
                            }
                            _ => {}
                        }
                    }

                    // 拖拽交互全部交给控制器
                    WindowEvent::MouseInput { state, button, .. } => {
                        let button = match button {
                            MouseButton::Left => Some(PointerButton::Primary),
                            MouseButton::Middle => Some(PointerButton::Middle),
                            MouseButton::Right => Some(PointerButton::Secondary),
                            _ => None,
                        };
                        match (state, button) {
                            (ElementState::Pressed, Some(b)) => viewer.controls.pointer_down(b, cursor),
                            (ElementState::Released, _) => viewer.controls.pointer_up(),
                            _ => {}
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = [position.x as f32, position.y as f32];
                        if viewer.controls.is_dragging() {
                            let (w, h) = viewer.container().layout_size();
                            let camera = viewer.camera().clone();
                            viewer
                                .controls
                                .pointer_move(cursor, [w as f32, h as f32], &camera);
                        }
                    }

                    WindowEvent::CursorLeft { .. } => viewer.controls.pointer_up(),

                    WindowEvent::MouseWheel { delta, .. } => {
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => y,
                            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 20.0,
                        };
                        viewer.controls.wheel(scroll);
                    }

                    WindowEvent::DroppedFile(path) => load_source(&path, &mut viewer),

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => match viewer.animate(&mut scheduler) {
                Ok(Frame::Rendered) => {}
                Ok(Frame::Stopped) => *control_flow = ControlFlow::Exit,
                Err(e) => {
                    log::error!("{e}");
                    *control_flow = ControlFlow::Exit;
                }
            },

            _ => {}
        }

        if stop.is_stopped() {
            *control_flow = ControlFlow::Exit;
        }
    });
}
