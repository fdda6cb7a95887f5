//! Narrow capability interfaces the SIP/media stack must satisfy (spec §6
//! "SIP/media (consumed as opaque API)", §9 "dynamic dispatch via
//! inheritance ... maps to trait-like capability interfaces"). The SIP/RTP
//! stack itself is out of scope; only the seam this crate calls through is
//! defined here.

use std::path::Path;
use std::sync::Arc;

use crate::error::MediaError;

/// A live outbound-audio transmit port for one playing file. Dropping or
/// calling `stop` tears the port down; implementations must make repeated
/// `stop` calls a no-op.
pub trait PlaybackHandle: Send + Sync {
    fn stop(&self);
}

/// The call's media sink: starts/stops transmitting a file's audio into
/// the RTP stream. Calls must be synchronous — SmartPlayer's enqueue and
/// interrupt paths run on the event loop thread and must not suspend.
pub trait MediaSink: Send + Sync {
    fn start_transmit(&self, file: &Path) -> Result<Box<dyn PlaybackHandle>, MediaError>;
}

/// The call's recording sink (internals out of scope; spec §1 Non-goals).
pub trait Recorder: Send + Sync {
    fn start(&self, file: &Path) -> Result<(), MediaError>;
    fn stop(&self);
}

/// Incoming-call/frame capability a `PjAccount`-equivalent binding exposes.
pub trait CallEvents: Send + Sync {
    fn on_incoming_call(&self, call_id: &str);
    fn on_frame_received(&self, call_id: &str, pcm16: &[u8]);
}

/// Call-control surface a `PjCall`-equivalent binding exposes (spec §6
/// "answer/hangup/xfer/dialDtmf/getInfo/makeCall"). The dialog engine's
/// soft-hangup/transfer paths call through this rather than the SIP stack
/// directly.
#[async_trait::async_trait]
pub trait CallControl: Send + Sync {
    /// Tag the BYE with a semantic header (spec §6 `X-App-Bye-Tag`) and hang
    /// up.
    async fn hangup(&self, bye_tag: Option<&str>) -> Result<(), MediaError>;

    /// In-band DTMF transfer: dial `digits`, then wait `delay` before
    /// treating the transfer as complete.
    async fn dial_dtmf(&self, digits: &str, delay: std::time::Duration) -> Result<(), MediaError>;

    /// SIP REFER-style transfer to `to_uri`.
    async fn xfer(&self, to_uri: &str) -> Result<(), MediaError>;

    /// `true` once the call has been answered/confirmed.
    fn is_confirmed(&self) -> bool;
}

/// Account-level surface the operator REST layer (spec §6 `POST /call`)
/// calls through to place an outbound call. Returns the native call id the
/// subsequent `CallEvents`/`CallControl` traffic for that call will carry.
#[async_trait::async_trait]
pub trait CallPlacer: Send + Sync {
    async fn make_call(&self, to_uri: &str) -> Result<String, MediaError>;
}

/// Per-call collaborator factory the SIP binding exposes alongside
/// `CallEvents` (spec §9 "rewrite native callbacks … to take the handle …
/// as a dependency rather than reading a global"): given the native call
/// id an `on_incoming_call` callback carried, hands back the
/// `CallControl`/`MediaSink` for that leg so the caller can stand up a
/// `CallDialogEngine`.
pub trait CallBinding: Send + Sync {
    fn call_control(&self, call_id: &str) -> Arc<dyn CallControl>;
    fn media_sink(&self, call_id: &str) -> Arc<dyn MediaSink>;
}

struct LoopbackPlaybackHandle;

impl PlaybackHandle for LoopbackPlaybackHandle {
    fn stop(&self) {}
}

struct LoopbackMediaSink;

impl MediaSink for LoopbackMediaSink {
    fn start_transmit(&self, _file: &Path) -> Result<Box<dyn PlaybackHandle>, MediaError> {
        Ok(Box::new(LoopbackPlaybackHandle))
    }
}

struct LoopbackCallControl;

#[async_trait::async_trait]
impl CallControl for LoopbackCallControl {
    async fn hangup(&self, _bye_tag: Option<&str>) -> Result<(), MediaError> {
        Ok(())
    }

    async fn dial_dtmf(&self, _digits: &str, _delay: std::time::Duration) -> Result<(), MediaError> {
        Ok(())
    }

    async fn xfer(&self, _to_uri: &str) -> Result<(), MediaError> {
        Ok(())
    }

    fn is_confirmed(&self) -> bool {
        true
    }
}

/// Default `CallBinding`/`CallPlacer`: transmits nowhere and answers
/// immediately. Stands in for a real SIP/RTP stack (spec §1 Non-goals:
/// "No SIP stack reimplementation") so the operator REST surface and the
/// per-call dialog engine wiring are exercised end-to-end without one.
/// A deployment with a real SIP binding replaces this with its own
/// `CallBinding`/`CallPlacer` implementation of the same traits.
#[derive(Default)]
pub struct LoopbackBinding;

impl CallBinding for LoopbackBinding {
    fn call_control(&self, _call_id: &str) -> Arc<dyn CallControl> {
        Arc::new(LoopbackCallControl)
    }

    fn media_sink(&self, _call_id: &str) -> Arc<dyn MediaSink> {
        Arc::new(LoopbackMediaSink)
    }
}

#[async_trait::async_trait]
impl CallPlacer for LoopbackBinding {
    async fn make_call(&self, _to_uri: &str) -> Result<String, MediaError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
