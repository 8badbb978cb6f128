//! Mod-10 (Luhn) validation of order numbers.

const BASE: i64 = 10;

/// True when `number`'s decimal digits pass the Luhn check.
pub fn is_valid(number: i64) -> bool {
    if number <= 0 {
        return false;
    }
    (number % BASE + checksum(number / BASE)) % BASE == 0
}

fn checksum(mut number: i64) -> i64 {
    let mut sum = 0;
    let mut position = 0;
    while number > 0 {
        let mut digit = number % BASE;
        if position % 2 == 0 {
            digit *= 2;
            if digit > BASE - 1 {
                digit = digit % BASE + digit / BASE;
            }
        }
        sum += digit;
        number /= BASE;
        position += 1;
    }
    sum % BASE
}
