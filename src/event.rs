//! Component event parsing.
//!
//! Components report apply outcomes as a comma-separated string of five fields:
//! `name,tx_id,version,status,timeout`. This module turns that wire format into a typed
//! [`Event`], classifying it into an [`EventKind`] using the same ordered rule set the original
//! C event handler used, edge cases included.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Ack,
    Nack,
    Timeout,
    Expire,
    Crash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    pub tx_id: u16,
    pub version: u32,
    pub kind: EventKind,
    pub timeout: u32,
    pub status: String,
}

impl Event {
    /// Parse `name,tx_id,version,status,timeout` into an [`Event`].
    ///
    /// Missing fields are treated as empty/zero rather than rejected; a malformed numeric field
    /// becomes `0`. This keeps the parser infallible for any UTF-8 input, matching the original
    /// handler, which only ever failed on allocation.
    pub fn parse(raw: &str) -> Event {
        let mut fields = raw.splitn(5, ',');
        let name = fields.next().unwrap_or("").to_string();
        let tx_id: u16 = fields.next().unwrap_or("").trim().parse().unwrap_or(0);
        let version: u32 = fields.next().unwrap_or("").trim().parse().unwrap_or(0);
        let status = fields.next().unwrap_or("").to_string();
        let timeout: u32 = fields.next().unwrap_or("").trim().parse().unwrap_or(0);

        let kind = classify(&status, timeout);

        Event {
            name,
            tx_id,
            version,
            kind,
            timeout,
            status,
        }
    }

    /// Format the synthetic `EXPIRE` event a timer-expiry produces:
    /// `"<name>,<tx_id>,0,EXPIRE,0"`.
    pub fn format_expire(name: &str, tx_id: u16) -> String {
        format!("{name},{tx_id},0,EXPIRE,0")
    }
}

/// First-match-wins classification, preserved verbatim from the original dispatcher's
/// if/else-if chain:
/// 1. `status == "ACK"` and `timeout == 0` -> Ack
/// 2. `status == "NACK"` and `timeout == 0` -> Nack
/// 3. `status == "EXPIRE"` -> Expire
/// 4. `timeout != 0` -> Timeout
/// 5. else -> Crash
///
/// Note the deliberate edge case this preserves: a `Timeout`-shaped event with `timeout == 0`
/// falls through rules 1-4 and is classified `Crash`.
fn classify(status: &str, timeout: u32) -> EventKind {
    if status == "ACK" && timeout == 0 {
        EventKind::Ack
    } else if status == "NACK" && timeout == 0 {
        EventKind::Nack
    } else if status == "EXPIRE" {
        EventKind::Expire
    } else if timeout != 0 {
        EventKind::Timeout
    } else {
        EventKind::Crash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_happy_ack() {
        let e = Event::parse("wifi,10,5,ACK,0");
        assert_eq!(e.name, "wifi");
        assert_eq!(e.tx_id, 10);
        assert_eq!(e.version, 5);
        assert_eq!(e.kind, EventKind::Ack);
    }

    #[test]
    fn parses_nack() {
        let e = Event::parse("wifi,10,5,NACK,0");
        assert_eq!(e.kind, EventKind::Nack);
    }

    #[test]
    fn parses_timeout() {
        let e = Event::parse("wifi,10,5,,30");
        assert_eq!(e.kind, EventKind::Timeout);
        assert_eq!(e.timeout, 30);
    }

    #[test]
    fn parses_expire() {
        let e = Event::parse("wifi,1234,0,EXPIRE,0");
        assert_eq!(e.kind, EventKind::Expire);
    }

    #[test]
    fn timeout_zero_degrades_to_crash() {
        // A TIMEOUT-shaped event with timeout=0 misses rules 1-4 and is classified Crash.
        let e = Event::parse("wifi,10,5,,0");
        assert_eq!(e.kind, EventKind::Crash);
    }

    #[test]
    fn malformed_numeric_fields_become_zero() {
        let e = Event::parse("wifi,not-a-number,also-not,ACK,nope");
        assert_eq!(e.tx_id, 0);
        assert_eq!(e.version, 0);
        assert_eq!(e.timeout, 0);
        // status="ACK", timeout=0 -> Ack
        assert_eq!(e.kind, EventKind::Ack);
    }

    #[test]
    fn missing_trailing_fields_default_empty() {
        let e = Event::parse("wifi");
        assert_eq!(e.name, "wifi");
        assert_eq!(e.tx_id, 0);
        assert_eq!(e.status, "");
        assert_eq!(e.kind, EventKind::Crash);
    }

    #[test]
    fn format_expire_matches_wire_format() {
        assert_eq!(Event::format_expire("wifi", 1234), "wifi,1234,0,EXPIRE,0");
        let e = Event::parse(&Event::format_expire("wifi", 1234));
        assert_eq!(e.kind, EventKind::Expire);
        assert_eq!(e.tx_id, 1234);
    }
}
