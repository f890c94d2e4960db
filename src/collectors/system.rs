use crate::collectors::ParseError;

pub const MEMORY_COMMAND: &str = "free -m";
pub const UPTIME_COMMAND: &str = "uptime -p";
pub const STORAGE_COMMAND: &str = "df -h --total | grep total";
pub const CPU_COMMAND: &str = "top -bn1 | grep '%Cpu(s)'";
pub const DISTRO_COMMAND: &str = "lsb_release -d";
pub const KERNEL_COMMAND: &str = "uname -r";

/// `free -m`: the `Mem:` row is the second line; columns 2 and 3 are total
/// and used megabytes. Returns `(total, used)`.
pub fn parse_memory(text: &str) -> Result<(u64, u64), ParseError> {
    let line = text
        .lines()
        .nth(1)
        .ok_or(ParseError::MissingLine { line: 2 })?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    let total = parse_u64(column(&cols, 1, line)?)?;
    let used = parse_u64(column(&cols, 2, line)?)?;
    Ok((total, used))
}

pub fn parse_uptime(text: &str) -> Result<String, ParseError> {
    non_empty_trimmed(text)
}

/// Aggregate row of `df -h --total`. Returns `(total, used)` with the unit
/// suffix kept, e.g. `("100G", "40G")`.
pub fn parse_storage(text: &str) -> Result<(String, String), ParseError> {
    // grep may also match mounts with "total" in their path
    let line = text
        .lines()
        .rev()
        .find(|l| l.split_whitespace().next() == Some("total"))
        .ok_or(ParseError::MissingField("total"))?;
    let cols: Vec<&str> = line.split_whitespace().collect();
    let total = column(&cols, 1, line)?;
    let used = column(&cols, 2, line)?;

    parse_storage_amount(total)?;
    parse_storage_amount(used)?;
    Ok((total.to_string(), used.to_string()))
}

/// `%Cpu(s):  3.2 us,  1.0 sy, ...` (procps-ng) or `%Cpu(s):  3.2%us, ...`
/// (older procps). Returns the user-space percentage.
pub fn parse_cpu_usage(text: &str) -> Result<f64, ParseError> {
    let line = text
        .lines()
        .find(|l| l.contains("%Cpu"))
        .ok_or(ParseError::MissingField("%Cpu(s)"))?;
    let (_, fields) = line
        .split_once(':')
        .ok_or(ParseError::MissingField("us"))?;

    // fields are separated by ", "; a bare comma is a decimal separator
    // in some locales ("3,2 us")
    for field in fields.split(", ") {
        let Some(value) = field.trim().trim_end_matches(',').strip_suffix("us") else {
            continue;
        };
        let value = value.trim().trim_end_matches('%').trim();
        let cpu: f64 = value
            .replace(',', ".")
            .parse()
            .map_err(|_| ParseError::InvalidNumber {
                value: value.to_string(),
            })?;
        if !(0.0..=100.0).contains(&cpu) {
            return Err(ParseError::OutOfRange {
                value: cpu,
                min: 0.0,
                max: 100.0,
            });
        }
        return Ok(cpu);
    }

    Err(ParseError::MissingField("us"))
}

/// `Description:\tUbuntu 22.04.4 LTS` -> `Ubuntu 22.04.4 LTS`.
pub fn parse_distro(text: &str) -> Result<String, ParseError> {
    let (_, name) = text
        .split_once(':')
        .ok_or(ParseError::MissingField("Description"))?;
    non_empty_trimmed(name)
}

pub fn parse_kernel(text: &str) -> Result<String, ParseError> {
    non_empty_trimmed(text)
}

/// A `df -h` size: number plus an optional single-letter unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageAmount {
    pub value: f64,
    pub unit: Option<char>,
}

impl StorageAmount {
    pub fn bytes(&self) -> f64 {
        let exp = match self.unit {
            Some('K') => 1,
            Some('M') => 2,
            Some('G') => 3,
            Some('T') => 4,
            Some('P') => 5,
            Some('E') => 6,
            _ => 0,
        };
        self.value * 1024_f64.powi(exp)
    }
}

pub fn parse_storage_amount(raw: &str) -> Result<StorageAmount, ParseError> {
    let raw = raw.trim();
    let (number, unit) = match raw.chars().last() {
        None => return Err(ParseError::Empty),
        Some(c) if c.is_ascii_alphabetic() => (&raw[..raw.len() - 1], Some(c)),
        Some(_) => (raw, None),
    };
    if let Some(c) = unit {
        if !"BKMGTPE".contains(c) {
            return Err(ParseError::InvalidNumber {
                value: raw.to_string(),
            });
        }
    }

    // some locales print "1,5G"
    let value: f64 = number
        .replace(',', ".")
        .parse()
        .map_err(|_| ParseError::InvalidNumber {
            value: raw.to_string(),
        })?;
    if value < 0.0 || !value.is_finite() {
        return Err(ParseError::InvalidNumber {
            value: raw.to_string(),
        });
    }
    Ok(StorageAmount { value, unit })
}

pub(crate) fn non_empty_trimmed(text: &str) -> Result<String, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(text.to_string())
}

fn column<'a>(cols: &[&'a str], idx: usize, line: &str) -> Result<&'a str, ParseError> {
    cols.get(idx).copied().ok_or_else(|| ParseError::MissingColumn {
        column: idx + 1,
        line: line.to_string(),
    })
}

fn parse_u64(input: &str) -> Result<u64, ParseError> {
    input.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
        value: input.to_string(),
    })
}
