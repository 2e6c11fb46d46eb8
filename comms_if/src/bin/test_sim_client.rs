//! Stand-in simulator for exercising the drive executable without the real simulator.
//!
//! Models the vehicle as a point moving at constant speed whose heading is turned by the steering
//! demand. Telemetry frames are sent to the server and the replies applied to the model.

use comms_if::{
    net::{zmq, MonitoredSocket, SocketOptions},
    sim::Telemetry
};
use serde_json::Value;

/// Integration step of the model in seconds.
const DT_S: f64 = 0.05;

/// Maximum steering angle in radians, reached at a normalised demand of 1.
const MAX_STEER_RAD: f64 = 0.44;

/// Wheelbase of the modelled vehicle in meters.
const WHEELBASE_M: f64 = 2.67;

/// Cross track error the model starts each run with.
const INITIAL_CTE_M: f64 = 1.0;

struct Model {
    cte_m: f64,
    heading_rad: f64,
    speed_ms: f64,
    steer_rad: f64
}

impl Model {
    fn new() -> Self {
        Self {
            cte_m: INITIAL_CTE_M,
            heading_rad: 0.0,
            speed_ms: 5.0,
            steer_rad: 0.0
        }
    }

    fn step(&mut self, steer: f64, throttle: f64) {
        self.steer_rad = steer * MAX_STEER_RAD;
        self.speed_ms = (self.speed_ms + (throttle - 0.1) * DT_S * 10.0).max(0.0);
        self.heading_rad += self.speed_ms / WHEELBASE_M * self.steer_rad.tan() * DT_S;
        self.cte_m += self.speed_ms * self.heading_rad.sin() * DT_S;
    }

    fn telemetry(&self) -> Telemetry {
        Telemetry {
            cte: self.cte_m,
            speed: self.speed_ms,
            steering_angle: self.steer_rad.to_degrees()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let ctx = zmq::Context::new();

    let socket_options = SocketOptions {
        connect_timeout: 1000,
        heartbeat_ivl: 500,
        heartbeat_timeout: 1000,
        linger: 1,
        recv_timeout: 1000,
        send_timeout: 1000,
        ..Default::default()
    };

    let socket = match MonitoredSocket::new(
        &ctx,
        zmq::REQ,
        socket_options,
        "tcp://localhost:4567"
    ) {
        Ok(s) => s,
        Err(e) => {
            println!("Could not connect to the server");
            return Err(e.into())
        }
    };

    let mut model = Model::new();

    loop {
        // Readings go out as strings, the same way the real simulator sends them
        let t = model.telemetry();
        let frame = format!(
            "42[\"telemetry\",{{\"cte\":\"{}\",\"speed\":\"{}\",\"steering_angle\":\"{}\"}}]",
            t.cte, t.speed, t.steering_angle
        );
        socket.send(frame.as_str(), 0)?;

        let reply = match socket.recv_string(0)? {
            Ok(r) => r,
            Err(_) => {
                println!("Non UTF-8 reply from server");
                continue
            }
        };

        if reply.is_empty() {
            continue
        }

        let items: Vec<Value> = serde_json::from_str(&reply[2..])?;
        match items.get(0).and_then(Value::as_str) {
            Some("steer") => {
                let steer = items[1]["steering_angle"].as_f64().unwrap_or(0.0);
                let throttle = items[1]["throttle"].as_f64().unwrap_or(0.0);
                model.step(steer, throttle);
            },
            Some("reset") => {
                println!("Reset requested");
                model = Model::new();
            },
            other => println!("Unexpected reply: {:?}", other)
        }
    }
}
