//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.  Handlers never perform I/O; they read observations
//! from the context and post requests the controller carries out.
//!
//! ```text
//!  PROVISIONING ──[setup complete]──▶ CONNECTING ──[associated]──▶ AUTHENTICATING
//!       │                                │  ▲                          │      │
//!   [timeout]                     [retries spent]  └──[link lost]── OPERATING ◀─[ok]
//!       ▼                                ▼                                    │
//!    restart                           ERROR ◀──────────────[auth failed]─────┘
//!                                        │
//!                                   [cooldown] ──▶ restart
//! ```

use super::context::FsmContext;
use super::{StateDescriptor, StateId};
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Provisioning
        StateDescriptor {
            id: StateId::Provisioning,
            name: "PROVISIONING",
            on_enter: Some(provisioning_enter),
            on_exit: None,
            on_update: provisioning_update,
        },
        // Index 1: Connecting
        StateDescriptor {
            id: StateId::Connecting,
            name: "CONNECTING",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        // Index 2: Authenticating
        StateDescriptor {
            id: StateId::Authenticating,
            name: "AUTHENTICATING",
            on_enter: Some(authenticating_enter),
            on_exit: None,
            on_update: authenticating_update,
        },
        // Index 3: Operating
        StateDescriptor {
            id: StateId::Operating,
            name: "OPERATING",
            on_enter: Some(operating_enter),
            on_exit: None,
            on_update: operating_update,
        },
        // Index 4: Error
        StateDescriptor {
            id: StateId::Error,
            name: "ERROR",
            on_enter: Some(error_enter),
            on_exit: None,
            on_update: error_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROVISIONING state
// ═══════════════════════════════════════════════════════════════════════════

fn provisioning_enter(_ctx: &mut FsmContext) {
    info!("PROVISIONING: waiting for credentials over BLE");
}

fn provisioning_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.inputs.setup_complete {
        return Some(StateId::Connecting);
    }

    // Fail-safe against a stuck session: hard reset, not a soft transition.
    if ctx.ms_in_state() > u64::from(ctx.config.provisioning_timeout_ms) {
        warn!("PROVISIONING: timed out after {} ms", ctx.ms_in_state());
        ctx.requests.restart = Some("provisioning timeout");
        return None;
    }

    if !ctx.inputs.provisioning_active {
        ctx.requests.start_provisioning = true;
        ctx.request_status("disconnected", "not_authenticated", "idle");
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING state
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut FsmContext) {
    ctx.wifi_attempts = 0;
    ctx.last_attempt_ms = None;
    info!("CONNECTING: up to {} attempts", ctx.config.wifi_max_retries);
}

fn connecting_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.inputs.network_connected {
        ctx.request_status("connected", "not_authenticated", "idle");
        return Some(StateId::Authenticating);
    }

    // First attempt is immediate; later ones wait out the retry delay.
    if !ctx.elapsed_since(ctx.last_attempt_ms, ctx.config.wifi_retry_delay_ms) {
        return None;
    }

    if ctx.wifi_attempts >= ctx.config.wifi_max_retries {
        warn!("CONNECTING: giving up after {} attempts", ctx.wifi_attempts);
        ctx.request_status("failed", "not_authenticated", "error");
        return Some(StateId::Error);
    }

    ctx.wifi_attempts += 1;
    ctx.last_attempt_ms = Some(ctx.now_ms);
    ctx.requests.connect_network = true;
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  AUTHENTICATING state
// ═══════════════════════════════════════════════════════════════════════════

fn authenticating_enter(ctx: &mut FsmContext) {
    ctx.auth_requested = false;
    ctx.inputs.auth_result = None;
}

fn authenticating_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !ctx.auth_requested {
        ctx.auth_requested = true;
        ctx.requests.authenticate = true;
        return None;
    }

    match ctx.inputs.auth_result {
        Some(true) => {
            ctx.request_status("connected", "authenticated", "idle");
            Some(StateId::Operating)
        }
        Some(false) => {
            ctx.request_status("connected", "failed", "error");
            Some(StateId::Error)
        }
        None => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  OPERATING state
// ═══════════════════════════════════════════════════════════════════════════

fn operating_enter(ctx: &mut FsmContext) {
    ctx.last_poll_ms = None;
    ctx.settings_requested = false;
    info!("OPERATING: polling every {} ms", ctx.config.sensor_poll_interval_ms);
}

fn operating_update(ctx: &mut FsmContext) -> Option<StateId> {
    // Link loss wins over a due poll.
    if !ctx.inputs.network_connected {
        warn!("OPERATING: WiFi lost");
        ctx.request_status("disconnected", "not_authenticated", "error");
        return Some(StateId::Connecting);
    }

    // Once per visit, after any setup session has wound down.
    if ctx.inputs.setup_complete && !ctx.inputs.provisioning_active && !ctx.settings_requested {
        ctx.settings_requested = true;
        ctx.requests.start_settings = true;
    }

    if ctx.elapsed_since(ctx.last_poll_ms, ctx.config.sensor_poll_interval_ms) {
        ctx.last_poll_ms = Some(ctx.now_ms);
        ctx.requests.poll_sensors = true;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR state
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut FsmContext) {
    warn!("ERROR: restarting in {} ms", ctx.config.error_restart_delay_ms);
}

/// Terminal: the only way out is a restart after the cooldown.
fn error_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.ms_in_state() >= u64::from(ctx.config.error_restart_delay_ms) {
        ctx.requests.restart = Some("error cooldown elapsed");
    }
    None
}
