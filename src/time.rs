// time.rs
//! MJD + BCD time codec shared by TDT, TOT and EIT.
//!
//! DVB encodes a UTC instant in 40 bits: 16 bits of Modified Julian Date
//! (days since 1858-11-17) followed by six BCD digits of hh:mm:ss.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::buffer::ByteBuffer;

fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap()
}

/// Writes a UTC instant as MJD + 6 BCD digits.
pub fn put_utc(buf: &mut ByteBuffer, when: &NaiveDateTime) {
    let mjd = when.date().signed_duration_since(mjd_epoch()).num_days();
    buf.put_u16(mjd as u16);
    buf.put_bcd(when.hour() as u64, 2);
    buf.put_bcd(when.minute() as u64, 2);
    buf.put_bcd(when.second() as u64, 2);
}

/// Reads a UTC instant; `None` when the MJD or BCD digits are out of
/// range.
pub fn get_utc(buf: &mut ByteBuffer) -> Option<NaiveDateTime> {
    let mjd = buf.get_u16() as i64;
    let hour = buf.get_bcd(2) as u32;
    let minute = buf.get_bcd(2) as u32;
    let second = buf.get_bcd(2) as u32;
    if buf.read_error() {
        return None;
    }
    let date = mjd_epoch().checked_add_signed(Duration::days(mjd))?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(date, time))
}

/// Writes a duration in seconds as six BCD digits of hh:mm:ss.
pub fn put_bcd_duration(buf: &mut ByteBuffer, seconds: u32) {
    buf.put_bcd((seconds / 3600) as u64, 2);
    buf.put_bcd((seconds / 60 % 60) as u64, 2);
    buf.put_bcd((seconds % 60) as u64, 2);
}

/// Reads a six-BCD-digit hh:mm:ss duration back into seconds.
pub fn get_bcd_duration(buf: &mut ByteBuffer) -> u32 {
    let hours = buf.get_bcd(2) as u32;
    let minutes = buf.get_bcd(2) as u32;
    let seconds = buf.get_bcd(2) as u32;
    hours * 3600 + minutes * 60 + seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap().and_hms_opt(h, mi, s).unwrap()
    }

    #[test]
    fn test_reference_instant() {
        // 2017-12-25 is MJD 58112
        let when = dt(2017, 12, 25, 14, 55, 27);
        let mut buf = ByteBuffer::new();
        put_utc(&mut buf, &when);
        assert_eq!(buf.bytes(), &[0xE3, 0x00, 0x14, 0x55, 0x27]);
        let mut rd = ByteBuffer::from_slice(buf.bytes());
        assert_eq!(get_utc(&mut rd), Some(when));
    }

    #[test]
    fn test_mjd_epoch_is_zero() {
        let when = dt(1858, 11, 17, 0, 0, 0);
        let mut buf = ByteBuffer::new();
        put_utc(&mut buf, &when);
        assert_eq!(&buf.bytes()[..2], &[0x00, 0x00]);
    }

    #[test]
    fn test_bcd_duration() {
        let mut buf = ByteBuffer::new();
        put_bcd_duration(&mut buf, 2 * 3600 + 34 * 60 + 56);
        assert_eq!(buf.bytes(), &[0x02, 0x34, 0x56]);
        let mut rd = ByteBuffer::from_slice(buf.bytes());
        assert_eq!(get_bcd_duration(&mut rd), 2 * 3600 + 34 * 60 + 56);
    }

    #[test]
    fn test_bad_bcd_time_rejected() {
        // 0x99 hours is not a valid time of day
        let mut rd = ByteBuffer::from_slice(&[0xE3, 0x00, 0x99, 0x00, 0x00]);
        assert_eq!(get_utc(&mut rd), None);
    }
}
