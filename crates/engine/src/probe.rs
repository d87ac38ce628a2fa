//! Discovery, capability negotiation and the synchronized rate switch.
//!
//! Two roles share the frame plumbing: the active side (sender) drives
//! `IDLE → PROBING → CAPABILITY_SENT → SWITCHING → READY`, the passive side
//! (receiver) answers through `LISTENING → RESPONDED → CAPABILITY_APPLIED →
//! SWITCHING → READY`. Every transition logs one line; no transition is
//! retried silently.

use std::time::{Duration, Instant};

use protocol::probe::{
    CapabilityAck, CapabilityNego, PROBE_PROTOCOL_VERSION, ProbeRequest, ProbeResponse, SwitchAck,
    SwitchBaudrate,
};
use protocol::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, ProbeCommand, negotiate_chunk_size, recommended_chunk_size};
use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::ids::IdSource;
use crate::session::{Session, SessionOffer, TransferMode};
use transport::{FramedConnection, SerialLink};

/// Granularity of the receive loop between cancellation checks.
const POLL_SLICE: Duration = Duration::from_millis(100);

fn recv_until<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    deadline: Instant,
    cancel: &CancelToken,
) -> Result<Option<protocol::frame::Frame>, ProbeError> {
    loop {
        if cancel.is_cancelled() {
            return Err(ProbeError::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        let slice = (deadline - now).min(POLL_SLICE);
        if let Some(frame) = conn.recv(slice)? {
            return Ok(Some(frame));
        }
    }
}

/// Runs the active (sender-side) handshake to completion.
///
/// On success the underlying link has already been reprogrammed to the
/// negotiated rate and the returned [`Session`] carries the negotiated
/// chunk size.
pub fn run_active<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    cfg: &ProbeConfig,
    offer: &SessionOffer,
    clock: &dyn Clock,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
) -> Result<Session, ProbeError> {
    info!(state = "PROBING", "probing for a peer");
    let response = discover(conn, cfg, ids, cancel)?;

    let Some(&rate) = cfg
        .supported_baudrates
        .iter()
        .find(|rate| response.supported_baudrates.contains(rate))
    else {
        error!(
            phase = "probe",
            offered = ?response.supported_baudrates,
            "no common baudrate with peer"
        );
        return Err(ProbeError::NoCommonBaudrate);
    };

    let session_id = ids.wire_id();
    let recommended = recommended_chunk_size(rate);
    let nego = CapabilityNego {
        session_id,
        transfer_mode: offer.mode.into(),
        file_count: offer.file_count,
        total_size: offer.total_size,
        selected_baudrate: rate,
        chunk_size: recommended,
        root_path: offer.root_path.clone(),
    };
    info!(
        state = "CAPABILITY_SENT",
        session_id = format_args!("{session_id:#010x}"),
        baudrate = rate,
        chunk_size = recommended,
        file_count = offer.file_count,
        total_size = offer.total_size,
        "proposing session"
    );
    conn.send(ProbeCommand::CapabilityNego, &nego.encode())?;

    let ack = await_capability_ack(conn, session_id, cfg.capability_timeout, cancel)?;
    if ack.accept_status != CapabilityAck::ACCEPT {
        error!(
            phase = "capability",
            session_id = format_args!("{session_id:#010x}"),
            "peer rejected the session"
        );
        return Err(ProbeError::Rejected { session_id });
    }
    let chunk_size = ack.negotiated_chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);

    info!(
        state = "SWITCHING",
        session_id = format_args!("{session_id:#010x}"),
        baudrate = rate,
        "ordering rate switch"
    );
    let switch = SwitchBaudrate {
        session_id,
        new_baudrate: rate,
        switch_delay_ms: cfg.switch_delay_ms,
    };
    conn.send(ProbeCommand::SwitchBaudrate, &switch.encode())?;
    await_switch_ack(conn, session_id, cfg.switch_timeout, cancel)?;

    clock.sleep(Duration::from_millis(u64::from(cfg.switch_delay_ms)));
    conn.link_mut().set_baud_rate(rate)?;

    info!(
        state = "READY",
        session_id = format_args!("{session_id:#010x}"),
        baudrate = rate,
        chunk_size,
        "session established"
    );
    Ok(Session {
        id: session_id,
        baudrate: rate,
        chunk_size,
        mode: offer.mode,
        file_count: offer.file_count,
        total_size: offer.total_size,
        root_path: offer.root_path.clone(),
    })
}

fn discover<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    cfg: &ProbeConfig,
    ids: &mut dyn IdSource,
    cancel: &CancelToken,
) -> Result<ProbeResponse, ProbeError> {
    let total_deadline = Instant::now() + cfg.probe_total;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let request = ProbeRequest {
            device_id: ids.wire_id(),
            protocol_version: PROBE_PROTOCOL_VERSION,
            random_seed: ids.next_u32(),
        };
        debug!(
            attempt,
            device_id = format_args!("{:#010x}", request.device_id),
            "sending probe request"
        );
        conn.send(ProbeCommand::ProbeRequest, &request.encode())?;

        let attempt_deadline = (Instant::now() + cfg.probe_period).min(total_deadline);
        while let Some(frame) = recv_until(conn, attempt_deadline, cancel)? {
            match ProbeCommand::from_byte(frame.command) {
                Some(ProbeCommand::ProbeResponse) => match ProbeResponse::decode(&frame.payload) {
                    Ok(response) if response.matches(&request) => {
                        info!(
                            device_id = format_args!("{:#010x}", request.device_id),
                            rates = ?response.supported_baudrates,
                            "peer found"
                        );
                        return Ok(response);
                    }
                    Ok(_) => debug!("probe response for a different request ignored"),
                    Err(err) => warn!(error = %err, "malformed probe response ignored"),
                },
                other => debug!(command = ?other, "unexpected frame during discovery ignored"),
            }
        }

        if Instant::now() >= total_deadline {
            error!(phase = "probe", attempts = attempt, "no peer answered");
            return Err(ProbeError::Timeout {
                phase: "probe response",
            });
        }
        debug!(attempt, "probe attempt unanswered, retrying");
    }
}

fn await_capability_ack<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    session_id: u32,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<CapabilityAck, ProbeError> {
    let deadline = Instant::now() + timeout;
    while let Some(frame) = recv_until(conn, deadline, cancel)? {
        match ProbeCommand::from_byte(frame.command) {
            Some(ProbeCommand::CapabilityAck) => match CapabilityAck::decode(&frame.payload) {
                Ok(ack) if ack.session_id == session_id => return Ok(ack),
                Ok(ack) => debug!(
                    got = format_args!("{:#010x}", ack.session_id),
                    "capability ack for another session ignored"
                ),
                Err(err) => warn!(error = %err, "malformed capability ack ignored"),
            },
            other => debug!(command = ?other, "unexpected frame while awaiting capability ack"),
        }
    }
    error!(
        phase = "capability",
        session_id = format_args!("{session_id:#010x}"),
        "no capability ack"
    );
    Err(ProbeError::Timeout {
        phase: "capability ack",
    })
}

fn await_switch_ack<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    session_id: u32,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<SwitchAck, ProbeError> {
    let deadline = Instant::now() + timeout;
    while let Some(frame) = recv_until(conn, deadline, cancel)? {
        match ProbeCommand::from_byte(frame.command) {
            Some(ProbeCommand::SwitchAck) => match SwitchAck::decode(&frame.payload) {
                Ok(ack) if ack.session_id == session_id => return Ok(ack),
                Ok(_) => debug!("switch ack for another session ignored"),
                Err(err) => warn!(error = %err, "malformed switch ack ignored"),
            },
            other => debug!(command = ?other, "unexpected frame while awaiting switch ack"),
        }
    }
    error!(
        phase = "switch",
        session_id = format_args!("{session_id:#010x}"),
        "no switch ack"
    );
    Err(ProbeError::Timeout { phase: "switch ack" })
}

/// Runs the passive (receiver-side) handshake to completion.
///
/// On success the underlying link has been reprogrammed and the returned
/// [`Session`] records everything the sender declared.
pub fn run_passive<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    cfg: &ProbeConfig,
    clock: &dyn Clock,
    cancel: &CancelToken,
) -> Result<Session, ProbeError> {
    info!(state = "LISTENING", "waiting for a probing peer");
    let request = await_probe_request(conn, cfg.probe_total, cancel)?;
    let response = ProbeResponse::for_request(&request, cfg.supported_baudrates.clone());
    conn.send(ProbeCommand::ProbeResponse, &response.encode())?;
    info!(
        state = "RESPONDED",
        device_id = format_args!("{:#010x}", request.device_id),
        "discovery answered"
    );

    let nego = await_capability_nego(conn, cfg, cancel)?;

    if !cfg.supported_baudrates.contains(&nego.selected_baudrate) {
        let reject = CapabilityAck {
            session_id: nego.session_id,
            accept_status: CapabilityAck::REJECT,
            negotiated_chunk_size: MIN_CHUNK_SIZE,
        };
        conn.send(ProbeCommand::CapabilityAck, &reject.encode())?;
        error!(
            phase = "capability",
            session_id = format_args!("{:#010x}", nego.session_id),
            rate = nego.selected_baudrate,
            "selected baudrate unsupported, session rejected"
        );
        return Err(ProbeError::UnsupportedRate {
            rate: nego.selected_baudrate,
        });
    }

    let Some(mode) = TransferMode::from_byte(nego.transfer_mode) else {
        let reject = CapabilityAck {
            session_id: nego.session_id,
            accept_status: CapabilityAck::REJECT,
            negotiated_chunk_size: MIN_CHUNK_SIZE,
        };
        conn.send(ProbeCommand::CapabilityAck, &reject.encode())?;
        error!(
            phase = "capability",
            session_id = format_args!("{:#010x}", nego.session_id),
            mode = nego.transfer_mode,
            "unknown transfer mode, session rejected"
        );
        return Err(ProbeError::InvalidTransferMode(nego.transfer_mode));
    };

    let chunk_size = negotiate_chunk_size(nego.chunk_size, cfg.receiver_max_chunk);
    let accept = CapabilityAck {
        session_id: nego.session_id,
        accept_status: CapabilityAck::ACCEPT,
        negotiated_chunk_size: chunk_size,
    };
    conn.send(ProbeCommand::CapabilityAck, &accept.encode())?;
    info!(
        state = "CAPABILITY_APPLIED",
        session_id = format_args!("{:#010x}", nego.session_id),
        baudrate = nego.selected_baudrate,
        chunk_size,
        mode = ?mode,
        "session accepted"
    );

    let switch = await_switch_order(conn, cfg, &nego, &accept, cancel)?;
    if switch.session_id != nego.session_id {
        error!(
            phase = "switch",
            session_id = format_args!("{:#010x}", nego.session_id),
            got = format_args!("{:#010x}", switch.session_id),
            "switch order for a different session"
        );
        return Err(ProbeError::SessionMismatch {
            expected: nego.session_id,
            got: switch.session_id,
        });
    }
    if switch.new_baudrate != nego.selected_baudrate {
        error!(
            phase = "switch",
            session_id = format_args!("{:#010x}", nego.session_id),
            negotiated = nego.selected_baudrate,
            ordered = switch.new_baudrate,
            "switch order names the wrong rate"
        );
        return Err(ProbeError::RateMismatch {
            negotiated: nego.selected_baudrate,
            ordered: switch.new_baudrate,
        });
    }

    let ack = SwitchAck {
        session_id: nego.session_id,
    };
    conn.send(ProbeCommand::SwitchAck, &ack.encode())?;
    clock.sleep(Duration::from_millis(u64::from(switch.switch_delay_ms)));
    conn.link_mut().set_baud_rate(switch.new_baudrate)?;

    info!(
        state = "READY",
        session_id = format_args!("{:#010x}", nego.session_id),
        baudrate = switch.new_baudrate,
        "session established"
    );
    Ok(Session::from_nego(&nego, mode, chunk_size))
}

fn await_probe_request<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<ProbeRequest, ProbeError> {
    let deadline = Instant::now() + timeout;
    while let Some(frame) = recv_until(conn, deadline, cancel)? {
        match ProbeCommand::from_byte(frame.command) {
            Some(ProbeCommand::ProbeRequest) => match ProbeRequest::decode(&frame.payload) {
                Ok(request) => return Ok(request),
                Err(err) => warn!(error = %err, "malformed probe request ignored"),
            },
            other => debug!(command = ?other, "unexpected frame while listening ignored"),
        }
    }
    error!(phase = "probe", "no probe request arrived");
    Err(ProbeError::Timeout {
        phase: "probe request",
    })
}

fn await_capability_nego<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    cfg: &ProbeConfig,
    cancel: &CancelToken,
) -> Result<CapabilityNego, ProbeError> {
    let deadline = Instant::now() + cfg.capability_wait;
    while let Some(frame) = recv_until(conn, deadline, cancel)? {
        match ProbeCommand::from_byte(frame.command) {
            Some(ProbeCommand::CapabilityNego) => match CapabilityNego::decode(&frame.payload) {
                Ok(nego) => return Ok(nego),
                Err(err) => warn!(error = %err, "malformed capability proposal ignored"),
            },
            // The peer may not have seen our response yet; answer repeated
            // discovery idempotently.
            Some(ProbeCommand::ProbeRequest) => match ProbeRequest::decode(&frame.payload) {
                Ok(request) => {
                    debug!("repeated probe request, answering again");
                    let response =
                        ProbeResponse::for_request(&request, cfg.supported_baudrates.clone());
                    conn.send(ProbeCommand::ProbeResponse, &response.encode())?;
                }
                Err(err) => warn!(error = %err, "malformed probe request ignored"),
            },
            other => debug!(command = ?other, "unexpected frame while awaiting proposal"),
        }
    }
    error!(phase = "capability", "no capability proposal arrived");
    Err(ProbeError::Timeout {
        phase: "capability proposal",
    })
}

fn await_switch_order<L: SerialLink>(
    conn: &mut FramedConnection<L>,
    cfg: &ProbeConfig,
    nego: &CapabilityNego,
    accept: &CapabilityAck,
    cancel: &CancelToken,
) -> Result<SwitchBaudrate, ProbeError> {
    let deadline = Instant::now() + cfg.switch_wait;
    while let Some(frame) = recv_until(conn, deadline, cancel)? {
        match ProbeCommand::from_byte(frame.command) {
            Some(ProbeCommand::SwitchBaudrate) => match SwitchBaudrate::decode(&frame.payload) {
                Ok(switch) => return Ok(switch),
                Err(err) => warn!(error = %err, "malformed switch order ignored"),
            },
            // Our ack may have been lost; repeat it for the same session.
            Some(ProbeCommand::CapabilityNego) => match CapabilityNego::decode(&frame.payload) {
                Ok(repeat) if repeat.session_id == nego.session_id => {
                    debug!("repeated capability proposal, acknowledging again");
                    conn.send(ProbeCommand::CapabilityAck, &accept.encode())?;
                }
                Ok(_) => debug!("capability proposal for another session ignored"),
                Err(err) => warn!(error = %err, "malformed capability proposal ignored"),
            },
            other => debug!(command = ?other, "unexpected frame while awaiting switch order"),
        }
    }
    error!(
        phase = "switch",
        session_id = format_args!("{:#010x}", nego.session_id),
        "no switch order arrived"
    );
    Err(ProbeError::Timeout {
        phase: "switch order",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, SeededIds};
    use transport::testing::memory_link_pair;

    fn fast_probe_config(rates: &[u32]) -> ProbeConfig {
        ProbeConfig {
            supported_baudrates: rates.to_vec(),
            probe_period: Duration::from_millis(300),
            probe_total: Duration::from_secs(3),
            capability_timeout: Duration::from_secs(2),
            capability_wait: Duration::from_secs(2),
            switch_timeout: Duration::from_secs(2),
            switch_wait: Duration::from_secs(2),
            ..ProbeConfig::default()
        }
    }

    fn single_offer() -> SessionOffer {
        SessionOffer {
            mode: TransferMode::Single,
            file_count: 1,
            total_size: 100_000,
            root_path: String::new(),
        }
    }

    #[test]
    fn both_roles_complete_and_switch_rates() {
        let (link_a, link_b) = memory_link_pair();
        let active_cfg = fast_probe_config(&[921_600, 460_800, 115_200]);
        let passive_cfg = fast_probe_config(&[115_200, 460_800, 921_600]);

        let passive = std::thread::spawn(move || {
            let mut conn = FramedConnection::new(link_b);
            let clock = ManualClock::new();
            let session = run_passive(&mut conn, &passive_cfg, &clock, &CancelToken::new())?;
            Ok::<_, ProbeError>((session, conn.into_link()))
        });

        let mut conn = FramedConnection::new(link_a);
        let clock = ManualClock::new();
        let mut ids = SeededIds::new(11);
        let session = run_active(
            &mut conn,
            &active_cfg,
            &single_offer(),
            &clock,
            &mut ids,
            &CancelToken::new(),
        )
        .expect("active handshake");
        let (peer_session, peer_link) = passive.join().expect("no panic").expect("passive handshake");

        assert_eq!(session.baudrate, 921_600);
        assert_eq!(session.chunk_size, 2048);
        assert_eq!(peer_session.id, session.id);
        assert_eq!(peer_session.baudrate, 921_600);
        assert_eq!(peer_session.chunk_size, 2048);
        assert_eq!(peer_session.mode, TransferMode::Single);
        assert_eq!(peer_session.total_size, 100_000);
        assert_eq!(conn.into_link().baud_rate(), 921_600);
        assert_eq!(peer_link.baud_rate(), 921_600);
    }

    #[test]
    fn highest_common_rate_wins() {
        let (link_a, link_b) = memory_link_pair();
        let active_cfg = fast_probe_config(&[1_728_000, 460_800]);
        let passive_cfg = fast_probe_config(&[460_800, 115_200]);

        let passive = std::thread::spawn(move || {
            let mut conn = FramedConnection::new(link_b);
            run_passive(&mut conn, &passive_cfg, &ManualClock::new(), &CancelToken::new())
        });

        let mut conn = FramedConnection::new(link_a);
        let mut ids = SeededIds::new(3);
        let session = run_active(
            &mut conn,
            &active_cfg,
            &single_offer(),
            &ManualClock::new(),
            &mut ids,
            &CancelToken::new(),
        )
        .expect("active handshake");

        assert_eq!(session.baudrate, 460_800);
        assert_eq!(passive.join().expect("no panic").expect("passive").baudrate, 460_800);
    }

    #[test]
    fn disjoint_rate_lists_fail_fast() {
        let (link_a, link_b) = memory_link_pair();
        let active_cfg = fast_probe_config(&[1_728_000]);
        let passive_cfg = fast_probe_config(&[115_200]);

        let passive = std::thread::spawn(move || {
            let mut conn = FramedConnection::new(link_b);
            run_passive(&mut conn, &passive_cfg, &ManualClock::new(), &CancelToken::new())
        });

        let mut conn = FramedConnection::new(link_a);
        let mut ids = SeededIds::new(5);
        let err = run_active(
            &mut conn,
            &active_cfg,
            &single_offer(),
            &ManualClock::new(),
            &mut ids,
            &CancelToken::new(),
        )
        .expect_err("no common rate");
        assert!(matches!(err, ProbeError::NoCommonBaudrate));

        // The passive side never hears a proposal and times out.
        let peer_err = passive.join().expect("no panic").expect_err("passive times out");
        assert!(matches!(peer_err, ProbeError::Timeout { .. }));
    }

    #[test]
    fn unsupported_selected_rate_is_rejected() {
        let (link_a, link_b) = memory_link_pair();
        let passive_cfg = fast_probe_config(&[460_800]);

        let passive = std::thread::spawn(move || {
            let mut conn = FramedConnection::new(link_b);
            run_passive(&mut conn, &passive_cfg, &ManualClock::new(), &CancelToken::new())
        });

        // Scripted active peer that ignores the advertised list and
        // proposes a rate the passive side cannot run.
        let mut conn = FramedConnection::new(link_a);
        let request = ProbeRequest {
            device_id: 0x1000_0042,
            protocol_version: PROBE_PROTOCOL_VERSION,
            random_seed: 7,
        };
        conn.send(ProbeCommand::ProbeRequest, &request.encode()).expect("send");
        let frame = conn
            .recv(Duration::from_secs(2))
            .expect("recv")
            .expect("response");
        assert_eq!(frame.command, u8::from(ProbeCommand::ProbeResponse));

        let nego = CapabilityNego {
            session_id: 0x1000_0099,
            transfer_mode: 1,
            file_count: 1,
            total_size: 10,
            selected_baudrate: 921_600,
            chunk_size: 2048,
            root_path: String::new(),
        };
        conn.send(ProbeCommand::CapabilityNego, &nego.encode()).expect("send");

        let frame = conn.recv(Duration::from_secs(2)).expect("recv").expect("ack");
        let ack = CapabilityAck::decode(&frame.payload).expect("decode");
        assert_eq!(ack.accept_status, CapabilityAck::REJECT);

        let err = passive.join().expect("no panic").expect_err("rejected");
        assert!(matches!(err, ProbeError::UnsupportedRate { rate: 921_600 }));
    }

    #[test]
    fn repeated_probe_requests_are_answered_idempotently() {
        let (link_a, link_b) = memory_link_pair();
        let passive_cfg = fast_probe_config(&[115_200]);

        let passive = std::thread::spawn(move || {
            let mut conn = FramedConnection::new(link_b);
            // Times out eventually; this test only cares about the responses.
            let _ = run_passive(&mut conn, &passive_cfg, &ManualClock::new(), &CancelToken::new());
        });

        let mut conn = FramedConnection::new(link_a);
        let request = ProbeRequest {
            device_id: 0x1000_0021,
            protocol_version: PROBE_PROTOCOL_VERSION,
            random_seed: 3,
        };

        for _ in 0..2 {
            conn.send(ProbeCommand::ProbeRequest, &request.encode()).expect("send");
            let frame = conn
                .recv(Duration::from_secs(2))
                .expect("recv")
                .expect("response");
            let response = ProbeResponse::decode(&frame.payload).expect("decode");
            assert!(response.matches(&request));
        }

        passive.join().expect("no panic");
    }
}
