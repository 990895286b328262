use anyhow::Result;
use log::{debug, error, info, warn};
use serde::Serialize;

/// Keys the pipeline can drive. W/A/S/D belong to movement; the rest are
/// available to one-shot gesture bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Key {
    W,
    A,
    S,
    D,
    Ctrl,
    Shift,
    Space,
    Tab,
    T,
    E,
    R,
    F,
    Q,
    C,
}

impl Key {
    pub const ALL: [Key; 14] = [
        Key::W,
        Key::A,
        Key::S,
        Key::D,
        Key::Ctrl,
        Key::Shift,
        Key::Space,
        Key::Tab,
        Key::T,
        Key::E,
        Key::R,
        Key::F,
        Key::Q,
        Key::C,
    ];

    pub fn parse(tok: &str) -> Option<Self> {
        let k = match tok.to_ascii_uppercase().as_str() {
            "W" => Key::W,
            "A" => Key::A,
            "S" => Key::S,
            "D" => Key::D,
            "CTRL" | "CONTROL" => Key::Ctrl,
            "SHIFT" => Key::Shift,
            "SPACE" => Key::Space,
            "TAB" => Key::Tab,
            "T" => Key::T,
            "E" => Key::E,
            "R" => Key::R,
            "F" => Key::F,
            "Q" => Key::Q,
            "C" => Key::C,
            _ => return None,
        };
        Some(k)
    }

    pub fn is_movement(&self) -> bool {
        matches!(self, Key::W | Key::A | Key::S | Key::D)
    }
}

/// OS input injection as seen by the controllers. Fire-and-forget: an
/// implementation logs its own failures, so a release path can never be cut
/// short by an earlier error.
pub trait InputSink {
    fn key_down(&mut self, key: Key);
    fn key_up(&mut self, key: Key);
    fn press_once(&mut self, key: Key);
    fn mouse_down(&mut self);
    fn mouse_up(&mut self);
    fn move_relative(&mut self, dx: i32, dy: i32);
}

pub struct UinputSink {
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create()?;
            return Ok(Self {
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self { linux: None })
        }
    }

    pub fn noop() -> Self {
        Self { linux: None }
    }

    fn with_dev(&mut self, what: &str, f: impl FnOnce(&mut LinuxUinput) -> Result<()>) {
        match self.linux.as_mut() {
            Some(dev) => {
                if let Err(e) = f(dev) {
                    error!("uinput {what} failed: {e}");
                }
            }
            None => debug!("noop sink: {what}"),
        }
    }
}

impl InputSink for UinputSink {
    fn key_down(&mut self, key: Key) {
        self.with_dev("key down", |d| d.key_send(key, 1));
    }

    fn key_up(&mut self, key: Key) {
        self.with_dev("key up", |d| d.key_send(key, 0));
    }

    fn press_once(&mut self, key: Key) {
        self.with_dev("key press", |d| {
            d.key_send(key, 1)?;
            d.key_send(key, 0)
        });
    }

    fn mouse_down(&mut self) {
        self.with_dev("mouse down", |d| d.button_send(1));
    }

    fn mouse_up(&mut self) {
        self.with_dev("mouse up", |d| d.button_send(0));
    }

    fn move_relative(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        self.with_dev("move", |d| d.move_relative(dx, dy));
    }
}

#[cfg(target_os = "linux")]
fn map_key(key: Key) -> uinput::event::keyboard::Key {
    use uinput::event::keyboard::Key as K;
    match key {
        Key::W => K::W,
        Key::A => K::A,
        Key::S => K::S,
        Key::D => K::D,
        Key::Ctrl => K::LeftControl,
        Key::Shift => K::LeftShift,
        Key::Space => K::Space,
        Key::Tab => K::Tab,
        Key::T => K::T,
        Key::E => K::E,
        Key::R => K::R,
        Key::F => K::F,
        Key::Q => K::Q,
        Key::C => K::C,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(not(target_os = "linux"))]
struct LinuxUinput;

#[cfg(not(target_os = "linux"))]
impl LinuxUinput {
    fn key_send(&mut self, _key: Key, _val: i32) -> Result<()> {
        Ok(())
    }
    fn button_send(&mut self, _val: i32) -> Result<()> {
        Ok(())
    }
    fn move_relative(&mut self, _dx: i32, _dy: i32) -> Result<()> {
        Ok(())
    }
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create() -> Result<Self> {
        use uinput::event::{controller::Mouse, relative};

        let mut builder = uinput::default()?
            .name("Gesturectl Virtual Input")?
            .event(relative::Position::X)?
            .event(relative::Position::Y)?
            .event(Mouse::Left)?;
        for k in Key::ALL {
            builder = builder.event(map_key(k))?;
        }
        let dev = builder.create()?;

        info!("uinput: created virtual device");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn key_send(&mut self, key: Key, val: i32) -> Result<()> {
        self.dev.send(map_key(key), val)?;
        self.sync()
    }

    fn button_send(&mut self, val: i32) -> Result<()> {
        use uinput::event::controller::Mouse;
        self.dev.send(Mouse::Left, val)?;
        self.sync()
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<()> {
        use uinput::event::relative::Position;
        if dx != 0 {
            self.dev.send(Position::X, dx)?;
        }
        if dy != 0 {
            self.dev.send(Position::Y, dy)?;
        }
        self.sync()
    }
}
