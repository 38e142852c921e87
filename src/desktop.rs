// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Desktop alerts for newly downloaded images

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::NotificationConfig;
use crate::{BucketwatchError, Result};

/// Local alert surface. Calls return once the alert is dispatched;
/// spawned helpers are reaped by the tokio runtime.
pub trait DesktopNotifier: Send + Sync {
    /// Show a notification with `title` and `body`
    fn notify(&self, title: &str, body: &str) -> Result<()>;

    /// Play the audible alert, if any
    fn play_alert(&self) -> Result<()>;
}

/// Shells out to the platform notifier and audio player
pub struct SystemNotifier {
    sound: Option<PathBuf>,
}

impl SystemNotifier {
    pub fn new(sound: Option<PathBuf>) -> Self {
        Self { sound }
    }
}

fn spawn_detached(command: &mut Command) -> Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| {
            BucketwatchError::Notification(format!("{:?}: {}", command.as_std().get_program(), e))
        })
}

#[cfg(target_os = "linux")]
fn notify_command(title: &str, body: &str) -> Option<Command> {
    let mut command = Command::new("notify-send");
    command.args(["--urgency=critical", title, body]);
    Some(command)
}

#[cfg(target_os = "linux")]
fn sound_command(sound: &Path) -> Option<Command> {
    let mut command = Command::new("paplay");
    command.arg(sound);
    Some(command)
}

#[cfg(target_os = "macos")]
fn applescript_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(target_os = "macos")]
fn notify_command(title: &str, body: &str) -> Option<Command> {
    let script = format!(
        "display notification {} with title {}",
        applescript_quote(body),
        applescript_quote(title)
    );
    let mut command = Command::new("osascript");
    command.args(["-e", &script]);
    Some(command)
}

#[cfg(target_os = "macos")]
fn sound_command(sound: &Path) -> Option<Command> {
    let mut command = Command::new("afplay");
    command.arg(sound);
    Some(command)
}

#[cfg(target_os = "windows")]
fn powershell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(target_os = "windows")]
fn notify_command(title: &str, body: &str) -> Option<Command> {
    let script = format!(
        "[reflection.assembly]::loadwithpartialname('System.Windows.Forms') | Out-Null; \
         $n = New-Object System.Windows.Forms.NotifyIcon; \
         $n.Icon = [System.Drawing.SystemIcons]::Information; \
         $n.Visible = $true; $n.ShowBalloonTip(5000, {}, {}, 'Info')",
        powershell_quote(title),
        powershell_quote(body)
    );
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-Command", &script]);
    Some(command)
}

#[cfg(target_os = "windows")]
fn sound_command(sound: &Path) -> Option<Command> {
    let script = format!(
        "(New-Object Media.SoundPlayer {}).PlaySync()",
        powershell_quote(&sound.to_string_lossy())
    );
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-Command", &script]);
    Some(command)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn notify_command(_title: &str, _body: &str) -> Option<Command> {
    None
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn sound_command(_sound: &Path) -> Option<Command> {
    None
}

impl DesktopNotifier for SystemNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        debug!("Desktop notification: {} - {}", title, body);
        let mut command = notify_command(title, body).ok_or_else(|| {
            BucketwatchError::Notification("no notifier for this platform".to_string())
        })?;
        spawn_detached(&mut command)
    }

    fn play_alert(&self) -> Result<()> {
        let Some(sound) = &self.sound else {
            return Ok(());
        };
        if !sound.exists() {
            return Err(BucketwatchError::Notification(format!("sound file missing: {:?}", sound)));
        }
        let mut command = sound_command(sound).ok_or_else(|| {
            BucketwatchError::Notification("no audio player for this platform".to_string())
        })?;
        spawn_detached(&mut command)
    }
}

/// Writes alerts to the log only
pub struct LogNotifier;

impl DesktopNotifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!("{}: {}", title, body);
        Ok(())
    }

    fn play_alert(&self) -> Result<()> {
        Ok(())
    }
}

/// Pick the notifier described by `config`
pub fn from_config(config: &NotificationConfig) -> Arc<dyn DesktopNotifier> {
    if config.enabled {
        Arc::new(SystemNotifier::new(config.sound.as_ref().map(PathBuf::from)))
    } else {
        Arc::new(LogNotifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("t", "b").is_ok());
        assert!(LogNotifier.play_alert().is_ok());
    }

    #[test]
    fn test_missing_sound_is_an_error() {
        let notifier = SystemNotifier::new(Some(PathBuf::from("/definitely/not/here.mp3")));
        assert!(matches!(notifier.play_alert(), Err(BucketwatchError::Notification(_))));
    }

    #[test]
    fn test_no_sound_is_silent() {
        assert!(SystemNotifier::new(None).play_alert().is_ok());
    }
}
