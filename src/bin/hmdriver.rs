//! hmdriver command line tool - drive a HarmonyOS device from the shell

use hmdriver::{
    Bridge, By, Device, DisplayRotation, Driver, DriverError, Hdc, KeyCode, Point,
    SessionConfig, UiDirection,
};
use std::env;
use std::path::Path;

/// Remove `--flag value` (any of `names`) from `args` and return the value
fn take_flag(args: &mut Vec<String>, names: &[&str]) -> hmdriver::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| names.contains(&a.as_str())) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        return Err(DriverError::InvalidArgument(format!(
            "{} needs a value",
            args[pos]
        )));
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

/// Build the session config from `--config`, then apply `--serial`, `--hdc` and `--port`
fn load_config(args: &mut Vec<String>) -> hmdriver::Result<SessionConfig> {
    let mut config = match take_flag(args, &["--config"])? {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(serial) = take_flag(args, &["-s", "--serial"])? {
        config.serial = serial;
    }
    if let Some(hdc) = take_flag(args, &["--hdc"])? {
        config.hdc = hdc.into();
    }
    if let Some(port) = take_flag(args, &["--port"])? {
        config.local_port = Some(parse_num(&port, "port")?);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> hmdriver::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args: Vec<String> = env::args().collect();
    let mut config = load_config(&mut args)?;

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    let hdc = Hdc::new(config.hdc.clone());
    let command = args[1].clone();

    if command == "devices" {
        let targets = list_targets(&hdc).await?;
        println!("List of devices attached:");
        for serial in targets {
            println!("{}", serial);
        }
        return Ok(());
    }

    if config.serial.is_empty() {
        config.serial = list_targets(&hdc)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::InvalidArgument("no device attached".into()))?;
    }

    match command.as_str() {
        "online" => {
            let device = Device::new(hdc, &config.serial)?;
            let online = device.is_online().await?;
            println!("{}: {}", config.serial, if online { "online" } else { "offline" });
        }

        "forwards" => {
            let device = Device::new(hdc, &config.serial)?;
            print!("{}", device.list_forwards().await?);
        }

        "screenshot" => {
            if args.len() < 3 {
                println!("Usage: hmdriver screenshot <output_path>");
                return Ok(());
            }
            let device = Device::new(hdc, &config.serial)?;
            let path = hmdriver::capture::capture_file(&device, Some(Path::new(&args[2]))).await?;
            println!("Screenshot saved to: {}", path.display());
        }

        _ => {
            let driver = Driver::start(hdc, &config, "", "").await?;
            let outcome = run_agent_command(&driver, &command, &args).await;
            driver.stop().await;
            outcome?;
        }
    }

    Ok(())
}

/// Commands that go through the on-device agent
async fn run_agent_command(driver: &Driver, command: &str, args: &[String]) -> hmdriver::Result<()> {
    match command {
        "click" | "double-click" | "long-click" => {
            if args.len() < 4 {
                println!("Usage: hmdriver {} <x> <y>", command);
                return Ok(());
            }
            let x: i32 = parse_num(&args[2], "x")?;
            let y: i32 = parse_num(&args[3], "y")?;
            match command {
                "click" => driver.click(x, y).await?,
                "double-click" => driver.double_click(x, y).await?,
                _ => driver.long_click(x, y).await?,
            }
            println!("{} at ({}, {})", command, x, y);
        }

        "swipe" => {
            if args.len() < 6 {
                println!("Usage: hmdriver swipe <x1> <y1> <x2> <y2> [seconds]");
                return Ok(());
            }
            let x1: i32 = parse_num(&args[2], "x1")?;
            let y1: i32 = parse_num(&args[3], "y1")?;
            let x2: i32 = parse_num(&args[4], "x2")?;
            let y2: i32 = parse_num(&args[5], "y2")?;
            let secs: f64 = match args.get(6) {
                Some(s) => parse_num(s, "seconds")?,
                None => 1.0,
            };
            driver
                .swipe(Point::new(x1, y1), Point::new(x2, y2), secs)
                .await?;
            println!("Swiped from ({}, {}) to ({}, {})", x1, y1, x2, y2);
        }

        "fling" => {
            let direction = match args.get(2).map(String::as_str) {
                Some("left") => UiDirection::Left,
                Some("right") => UiDirection::Right,
                Some("up") => UiDirection::Up,
                Some("down") => UiDirection::Down,
                _ => {
                    println!("Usage: hmdriver fling <left|right|up|down>");
                    return Ok(());
                }
            };
            driver.fling(direction, hmdriver::protocol::DEFAULT_SPEED).await?;
            println!("Flung {:?}", direction);
        }

        "home" => {
            driver.home().await?;
            println!("Pressed home");
        }

        "back" => {
            driver.back().await?;
            println!("Pressed back");
        }

        "key" => {
            if args.len() < 3 {
                println!("Usage: hmdriver key <keyname|code>");
                return Ok(());
            }
            let code = parse_keycode(&args[2])?;
            driver.press_key_code(code, 0, 0).await?;
            println!("Sent key event: {}", code);
        }

        "rotation" => match args.get(2) {
            Some(code) => {
                let rotation = DisplayRotation::from_code(parse_num(code, "rotation")?)
                    .ok_or_else(|| DriverError::InvalidArgument(format!("rotation {code} not in 0-3")))?;
                driver.set_rotation(rotation).await?;
                println!("Rotation set to {:?}", rotation);
            }
            None => println!("{:?}", driver.get_rotation().await?),
        },

        "size" => {
            let size = driver.screen_size().await?;
            println!("{}x{}", size.width, size.height);
        }

        "bundle" => {
            println!("{}", driver.current_bundle().await?);
        }

        "wakeup" => {
            driver.wake_up().await?;
            println!("Screen woken up");
        }

        "find" => {
            if args.len() < 4 {
                println!("Usage: hmdriver find <by> <value>");
                return Ok(());
            }
            let by = By::from_name(&args[2])
                .ok_or_else(|| DriverError::InvalidArgument(format!("unknown locator: {}", args[2])))?;
            match driver
                .find_element(by, &args[3], None, hmdriver::driver::DEFAULT_FIND_TIMEOUT_S)
                .await?
            {
                Some(mut element) => {
                    element.properties().await?;
                    println!("{}", element);
                }
                None => println!("No element matched {}={}", args[2], args[3]),
            }
        }

        _ => {
            print_usage();
        }
    }

    Ok(())
}

async fn list_targets(hdc: &Hdc) -> hmdriver::Result<Vec<String>> {
    let out = hdc
        .exec(&["list".to_string(), "targets".to_string()])
        .await?;
    Ok(out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains("[Empty]"))
        .map(str::to_string)
        .collect())
}

fn print_usage() {
    println!("hmdriver - HarmonyOS UI automation client");
    println!();
    println!("Usage: hmdriver [-s <serial>] [--config <file>] [--hdc <path>] [--port <local_port>] <command> [args...]");
    println!();
    println!("Commands:");
    println!("  devices                                 List attached devices");
    println!("  online                                  Check the device is attached");
    println!("  click <x> <y>                           Click at position");
    println!("  double-click <x> <y>                    Double click at position");
    println!("  long-click <x> <y>                      Long click at position");
    println!("  swipe <x1> <y1> <x2> <y2> [seconds]     Swipe from one position to another");
    println!("  fling <left|right|up|down>              Fling the screen");
    println!("  home | back                             Press home or back");
    println!("  key <keyname|code>                      Send key event");
    println!("  rotation [0-3]                          Show or set screen rotation");
    println!("  size                                    Show screen size");
    println!("  bundle                                  Show foreground app bundle");
    println!("  find <by> <value>                       Find an element (by: id, text, type, description, ...)");
    println!("  screenshot <path>                       Take screenshot");
    println!("  wakeup                                  Wake the screen");
    println!("  forwards                                List port forwards");
    println!();
    println!("Without -s the first attached device is used.");
    println!();
    println!("Keycodes: home, back, enter, backspace, escape, tab, space, delete, up, down,");
    println!("          left, right, volume_up, volume_down, power, a-z, 0-9, or a number");
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> hmdriver::Result<T> {
    s.parse()
        .map_err(|_| DriverError::InvalidArgument(format!("invalid {}: {}", what, s)))
}

fn parse_keycode(s: &str) -> hmdriver::Result<i32> {
    let key = match s.to_lowercase().as_str() {
        "home" => KeyCode::Home,
        "back" => KeyCode::Back,
        "enter" | "return" => KeyCode::Enter,
        "backspace" => KeyCode::Backspace,
        "escape" | "esc" => KeyCode::Escape,
        "tab" => KeyCode::Tab,
        "space" => KeyCode::Space,
        "delete" | "del" => KeyCode::Delete,
        "up" => KeyCode::DpadUp,
        "down" => KeyCode::DpadDown,
        "left" => KeyCode::DpadLeft,
        "right" => KeyCode::DpadRight,
        "volume_up" => KeyCode::VolumeUp,
        "volume_down" => KeyCode::VolumeDown,
        "mute" => KeyCode::VolumeMute,
        "power" => KeyCode::Power,
        "camera" => KeyCode::Camera,
        "play" | "pause" => KeyCode::MediaPlayPause,
        "a" => KeyCode::A,
        "b" => KeyCode::B,
        "c" => KeyCode::C,
        "d" => KeyCode::D,
        "e" => KeyCode::E,
        "f" => KeyCode::F,
        "g" => KeyCode::G,
        "h" => KeyCode::H,
        "i" => KeyCode::I,
        "j" => KeyCode::J,
        "k" => KeyCode::K,
        "l" => KeyCode::L,
        "m" => KeyCode::M,
        "n" => KeyCode::N,
        "o" => KeyCode::O,
        "p" => KeyCode::P,
        "q" => KeyCode::Q,
        "r" => KeyCode::R,
        "s" => KeyCode::S,
        "t" => KeyCode::T,
        "u" => KeyCode::U,
        "v" => KeyCode::V,
        "w" => KeyCode::W,
        "x" => KeyCode::X,
        "y" => KeyCode::Y,
        "z" => KeyCode::Z,
        "0" => KeyCode::Num0,
        "1" => KeyCode::Num1,
        "2" => KeyCode::Num2,
        "3" => KeyCode::Num3,
        "4" => KeyCode::Num4,
        "5" => KeyCode::Num5,
        "6" => KeyCode::Num6,
        "7" => KeyCode::Num7,
        "8" => KeyCode::Num8,
        "9" => KeyCode::Num9,
        other => return parse_num(other, "keycode"),
    };
    Ok(key.code())
}
