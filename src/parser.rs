//! Tokenizer for the firmware's syslog-style UDP lines.
//!
//! ```text
//! <16>2025-08-08T18:36:33.275Z 588c81c47a98[9313286]: [DEBUG][Core1] src/utils.cpp[printStatus]: Message
//! <16>2025-08-29T09:28:46.204Z [112882]: [DEBUG][Core1] src/ade7953.cpp[_printMeterValues]: Message
//! ```
//!
//! The device id segment is optional. Any other structural deviation yields
//! `None`; callers route such datagrams to the unparsed path.

use crate::log_entry::{LogRecord, UNKNOWN_DEVICE};

/// Decodes a datagram, replacing invalid UTF-8 instead of failing.
pub fn decode(datagram: &[u8]) -> String {
    String::from_utf8_lossy(datagram).into_owned()
}

pub fn parse(line: &str) -> Option<LogRecord> {
    let trimmed = line.trim();
    let mut cur = Cursor::new(trimmed);

    cur.eat('<')?;
    let priority = cur.number::<u32>()?;
    cur.eat('>')?;

    let timestamp = cur.timestamp()?;
    cur.whitespace()?;

    let device = cur.take_while(|c| c.is_ascii_hexdigit());
    cur.eat('[')?;
    let millis = cur.number::<u64>()?;
    cur.eat(']')?;
    cur.eat(':')?;
    cur.whitespace()?;

    cur.eat('[')?;
    let level = cur.take_while(|c| c != ']');
    if level.is_empty() {
        return None;
    }
    cur.eat(']')?;

    cur.literal("[Core")?;
    let core = cur.number::<u32>()?;
    cur.eat(']')?;
    cur.whitespace()?;

    let function = cur.take_while(|c| c != ':');
    cur.eat(':')?;
    cur.whitespace()?;
    let function = function.trim();
    if function.is_empty() {
        return None;
    }

    let message = cur.rest_of_line().trim();
    if message.is_empty() {
        return None;
    }

    let device_id = if device.is_empty() {
        UNKNOWN_DEVICE.to_string()
    } else {
        device.to_ascii_lowercase()
    };

    Some(LogRecord {
        priority,
        timestamp: timestamp.to_string(),
        device_id,
        millis,
        level: level.to_string(),
        core,
        function: function.to_string(),
        message: message.to_string(),
        raw: line.to_string(),
    })
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn eat(&mut self, want: char) -> Option<()> {
        if self.peek()? == want {
            self.pos += want.len_utf8();
            Some(())
        } else {
            None
        }
    }

    fn literal(&mut self, want: &str) -> Option<()> {
        if self.remaining().starts_with(want) {
            self.pos += want.len();
            Some(())
        } else {
            None
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.remaining();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn digits(&mut self, min: usize, exact: Option<usize>) -> Option<&'a str> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        let ok = match exact {
            Some(n) => digits.len() == n,
            None => digits.len() >= min,
        };
        ok.then_some(digits)
    }

    fn number<T: std::str::FromStr>(&mut self) -> Option<T> {
        self.digits(1, None)?.parse().ok()
    }

    /// One or more whitespace characters.
    fn whitespace(&mut self) -> Option<()> {
        let ws = self.take_while(char::is_whitespace);
        (!ws.is_empty()).then_some(())
    }

    /// `YYYY-MM-DDTHH:MM:SS.f+Z`, shape only.
    fn timestamp(&mut self) -> Option<&'a str> {
        let start = self.pos;
        self.digits(4, Some(4))?;
        self.eat('-')?;
        self.digits(2, Some(2))?;
        self.eat('-')?;
        self.digits(2, Some(2))?;
        self.eat('T')?;
        self.digits(2, Some(2))?;
        self.eat(':')?;
        self.digits(2, Some(2))?;
        self.eat(':')?;
        self.digits(2, Some(2))?;
        self.eat('.')?;
        self.digits(1, None)?;
        self.eat('Z')?;
        Some(&self.input[start..self.pos])
    }

    fn rest_of_line(&mut self) -> &'a str {
        let line = self.take_while(|c| c != '\n' && c != '\r');
        self.pos = self.input.len();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "<16>2025-08-08T18:36:33.275Z 588C81C47A98[9313286]: [DEBUG][Core1] src/utils.cpp[printDeviceStatusDynamic]: Free heap: 123 bytes";

    #[test]
    fn parses_full_line() {
        let record = parse(FULL).expect("should parse");
        assert_eq!(record.priority, 16);
        assert_eq!(record.timestamp, "2025-08-08T18:36:33.275Z");
        assert_eq!(record.device_id, "588c81c47a98");
        assert_eq!(record.millis, 9313286);
        assert_eq!(record.level, "DEBUG");
        assert_eq!(record.core, 1);
        assert_eq!(record.function, "src/utils.cpp[printDeviceStatusDynamic]");
        assert_eq!(record.message, "Free heap: 123 bytes");
        assert_eq!(record.raw, FULL);
    }

    #[test]
    fn missing_device_id_is_unknown() {
        let line = "<16>2025-08-29T09:28:46.204Z [112882]: [DEBUG][Core1] src/ade7953.cpp[_printMeterValues]: Meter values";
        let record = parse(line).expect("should parse");
        assert_eq!(record.device_id, UNKNOWN_DEVICE);
        assert_eq!(record.millis, 112882);
    }

    #[test]
    fn surrounding_whitespace_and_trailing_newline_ignored() {
        let line = format!("  {FULL}\r\n");
        let record = parse(&line).expect("should parse");
        assert_eq!(record.message, "Free heap: 123 bytes");
    }

    #[test]
    fn message_stops_at_line_break() {
        let line = "<14>2025-01-01T00:00:00.000Z ab[1]: [INFO][Core0] main: first\nsecond";
        assert_eq!(parse(line).unwrap().message, "first");
    }

    #[test]
    fn near_misses_do_not_match() {
        let cases = [
            "",
            "hello world",
            // missing priority bracket
            "16>2025-01-01T00:00:00.000Z ab[1]: [INFO][Core0] main: hi",
            // no fractional seconds
            "<16>2025-01-01T00:00:00Z ab[1]: [INFO][Core0] main: hi",
            // no whitespace after timestamp
            "<16>2025-01-01T00:00:00.000Zab[1]: [INFO][Core0] main: hi",
            // non-hex device id
            "<16>2025-01-01T00:00:00.000Z device-1[1]: [INFO][Core0] main: hi",
            // missing colon after millis
            "<16>2025-01-01T00:00:00.000Z ab[1] [INFO][Core0] main: hi",
            // missing closing bracket on level
            "<16>2025-01-01T00:00:00.000Z ab[1]: [INFO[Core0] main: hi",
            // empty level
            "<16>2025-01-01T00:00:00.000Z ab[1]: [][Core0] main: hi",
            // core tag misspelled
            "<16>2025-01-01T00:00:00.000Z ab[1]: [INFO][Cpu0] main: hi",
            // no function separator
            "<16>2025-01-01T00:00:00.000Z ab[1]: [INFO][Core0] main hi",
            // colon not followed by whitespace
            "<16>2025-01-01T00:00:00.000Z ab[1]: [INFO][Core0] main:hi",
            // empty message
            "<16>2025-01-01T00:00:00.000Z ab[1]: [INFO][Core0] main: ",
            // negative millis
            "<16>2025-01-01T00:00:00.000Z ab[-1]: [INFO][Core0] main: hi",
            // millis overflow
            "<16>2025-01-01T00:00:00.000Z ab[99999999999999999999999]: [INFO][Core0] main: hi",
        ];
        for case in cases {
            assert!(parse(case).is_none(), "unexpected match for {case:?}");
        }
    }

    #[test]
    fn every_truncation_is_no_match() {
        let cut_points: Vec<usize> = FULL.char_indices().map(|(i, _)| i).collect();
        // The message must keep at least one character to be a full line.
        let message_start = FULL.find("Free").unwrap();
        for end in cut_points.into_iter().filter(|&i| i < message_start) {
            assert!(parse(&FULL[..end]).is_none(), "truncated at {end} matched");
        }
    }

    #[test]
    fn lossy_decode_never_fails() {
        let mut bytes = b"<14>2025-01-01T00:00:00.000Z ab[5]: [INFO][Core0] main: caf".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let text = decode(&bytes);
        let record = parse(&text).expect("should parse");
        assert!(record.message.starts_with("caf"));
        assert!(record.message.contains('\u{FFFD}'));
    }

    #[test]
    fn wire_line_round_trips() {
        let record = parse(FULL).unwrap();
        let again = parse(&record.to_wire_line()).unwrap();
        assert_eq!(again.priority, record.priority);
        assert_eq!(again.device_id, record.device_id);
        assert_eq!(again.function, record.function);
        assert_eq!(again.message, record.message);
    }
}
