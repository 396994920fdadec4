//! Order identifiers: `F` + `YYYYMMDD` + `-` + 4 random `[A-Z0-9]` + `-` +
//! the last four digits of the customer's phone.

use chrono::NaiveDate;
use rand::Rng;

use crate::domain::value_objects::PhoneNumber;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const RANDOM_LEN: usize = 4;

pub fn generate_order_id<R: Rng + ?Sized>(day: NaiveDate, phone: &PhoneNumber, rng: &mut R) -> String {
    let token: String = (0..RANDOM_LEN).map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char).collect();
    format!("F{}-{}-{}", day.format("%Y%m%d"), token, phone.last_four())
}

/// Uses the thread-local generator; kept synchronous so the non-`Send`
/// generator never lives across an await point.
pub fn new_order_id(day: NaiveDate, phone: &PhoneNumber) -> String {
    generate_order_id(day, phone, &mut rand::thread_rng())
}
