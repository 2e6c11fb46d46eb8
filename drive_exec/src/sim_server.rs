//! # Simulator Server Module
//!
//! This module abstracts over the networking side of the drive executable. The simulator connects
//! to the server and sends one frame per step, and every frame received MUST be answered with
//! exactly one reply before the next frame can be read.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions},
    sim::{SimCmd, SimParseError}
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An abstraction over the networking part of the drive executable.
pub struct SimServer {
    /// REP socket which accepts frames from the simulator
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`SimServer`]
#[derive(thiserror::Error, Debug)]
pub enum SimServerError {
    #[error("Socket error: {0}")]
    SocketError(MonitoredSocketError),

    #[error("Could not recieve a frame from the simulator: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send a reply to the simulator: {0}")]
    SendError(zmq::Error),

    #[error("Could not encode the reply: {0}")]
    EncodeError(SimParseError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServer {

    /// Create a new instance of the simulator server.
    ///
    /// This function will not wait for the simulator to connect before returning.
    pub fn new(params: &NetParams) -> Result<Self, SimServerError> {

        let ctx = zmq::Context::new();

        let socket_options = SocketOptions {
            bind: true,
            block_on_first_connect: false,
            recv_timeout: 200,
            send_timeout: 10,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            socket_options,
            &params.sim_endpoint
        )?;

        Ok(Self { socket })
    }

    /// Retrieve the next frame from the simulator.
    ///
    /// `Ok(None)` is returned if no frame arrived before the recieve timeout. If a frame is
    /// returned the caller MUST reply with [`send_cmd`](Self::send_cmd). Any other error means
    /// the socket is unusable.
    pub fn get_frame(&mut self) -> Result<Option<String>, SimServerError> {
        match self.socket.recv_msg(0) {
            Ok(m) => Ok(Some(String::from_utf8_lossy(&m).into_owned())),
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(SimServerError::RecvError(e))
        }
    }

    /// Reply to the last frame. An empty reply is sent when there's no command.
    pub fn send_cmd(&mut self, cmd: Option<&SimCmd>) -> Result<(), SimServerError> {
        let frame = match cmd {
            Some(c) => c.to_frame().map_err(SimServerError::EncodeError)?,
            None => String::new()
        };

        self.socket.send(frame.as_str(), 0)
            .map_err(SimServerError::SendError)
    }

    /// Return if the simulator is connected.
    pub fn connected(&self) -> bool {
        self.socket.connected()
    }
}

impl From<MonitoredSocketError> for SimServerError {
    fn from(e: MonitoredSocketError) -> Self {
        SimServerError::SocketError(e)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_exchange_and_recv_error() {
        let params = NetParams {
            sim_endpoint: String::from("tcp://127.0.0.1:45671")
        };
        let mut server = SimServer::new(&params).unwrap();

        // Nothing sent yet, so the recieve times out
        assert!(server.get_frame().unwrap().is_none());

        let ctx = zmq::Context::new();
        let client = ctx.socket(zmq::REQ).unwrap();
        client.set_linger(0).unwrap();
        client.connect("tcp://127.0.0.1:45671").unwrap();
        client.send("42[\"telemetry\",null]", 0).unwrap();

        let mut frame = None;
        for _ in 0..25 {
            frame = server.get_frame().unwrap();
            if frame.is_some() {
                break
            }
        }
        assert_eq!(frame.as_deref(), Some("42[\"telemetry\",null]"));

        // Recieving again before replying is not a timeout, the caller gets
        // the error
        assert!(matches!(server.get_frame(), Err(SimServerError::RecvError(_))));

        server.send_cmd(Some(&SimCmd::Manual)).unwrap();
        assert_eq!(
            client.recv_string(0).unwrap().unwrap(),
            "42[\"manual\",{}]"
        );
    }
}
