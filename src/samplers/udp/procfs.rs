use super::address::AddressKeys;

use thiserror::Error;

use std::num::ParseIntError;
use std::path::{Path, PathBuf};

/// Location of the kernel's IPv4 UDP socket table.
pub const PROC_NET_UDP: &str = "/proc/net/udp";

// Column indices in /proc/net/udp
const LOCAL_ADDRESS: usize = 1;
const QUEUES: usize = 4;
const DROPS: usize = 12;

#[derive(Error, Debug)]
pub enum ProcNetUdpError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} entry not found for {keys}", .path.display())]
    NotFound { path: PathBuf, keys: AddressKeys },
    #[error("no rx_queue field {0}")]
    MissingRxQueue(String),
    #[error("failed to parse rx_queue: {0}")]
    ParseRxQueue(#[source] ParseIntError),
    #[error("failed to parse drops: {0}")]
    ParseDrops(#[source] ParseIntError),
}

/// Queue depth and drop count for one socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UdpSocketStats {
    pub rx_queue: i64,
    pub drops: i64,
}

/// Read the socket table at `path` and return the stats of the socket bound to
/// one of `keys`.
pub fn proc_net_udp(path: &Path, keys: &AddressKeys) -> Result<UdpSocketStats, ProcNetUdpError> {
    let table = std::fs::read(path).map_err(|source| ProcNetUdpError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    parse_proc_net_udp(&table, path, keys)
}

/// Find the first row of a `/proc/net/udp` style table whose local address is
/// one of `keys` and return its `rx_queue` and `drops` columns. `path` is only
/// used to describe where the table came from in errors.
///
/// ```text
///   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops
///  283: 0100007F:1F90 00000000:0000 07 00000000:00000000 00:00000000 00000000  1000        0 41227 2 0000000000000000 0
/// ```
pub fn parse_proc_net_udp(
    table: &[u8],
    path: &Path,
    keys: &AddressKeys,
) -> Result<UdpSocketStats, ProcNetUdpError> {
    let table = String::from_utf8_lossy(table);

    // the first line is the header
    for line in table.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();

        if fields.len() <= DROPS || !keys.matches(fields[LOCAL_ADDRESS]) {
            continue;
        }

        let (_, rx_queue) = fields[QUEUES]
            .split_once(':')
            .ok_or_else(|| ProcNetUdpError::MissingRxQueue(fields[QUEUES].to_string()))?;

        let rx_queue =
            i64::from_str_radix(rx_queue, 16).map_err(ProcNetUdpError::ParseRxQueue)?;
        let drops = i64::from_str_radix(fields[DROPS], 16).map_err(ProcNetUdpError::ParseDrops)?;

        return Ok(UdpSocketStats { rx_queue, drops });
    }

    Err(ProcNetUdpError::NotFound {
        path: path.to_path_buf(),
        keys: keys.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "   sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode ref pointer drops";

    fn keys(keys: &[&str]) -> AddressKeys {
        keys.iter().copied().collect()
    }

    fn parse(table: &str, candidates: &[&str]) -> Result<UdpSocketStats, ProcNetUdpError> {
        parse_proc_net_udp(table.as_bytes(), Path::new(PROC_NET_UDP), &keys(candidates))
    }

    #[test]
    fn matching_line() {
        let table = format!(
            "{HEADER}\n\
             283: 0100007F:1F90 00000000:0000 07 0:1A 00:00000000 00000000 1000 0 41227 2 0000000000000000 5\n"
        );

        assert_eq!(
            parse(&table, &["0100007F:1F90"]).unwrap(),
            UdpSocketStats {
                rx_queue: 26,
                drops: 5
            }
        );
    }

    #[test]
    fn kernel_formatting() {
        let table = format!(
            "{HEADER}\n\
             \x20 75: 00000000:0044 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 17936 2 0000000000000000 0\n\
             \x20283: 0100007F:1F90 00000000:0000 07 00000000:00000200 00:00000000 00000000  1000        0 41227 2 0000000000000000 1F\n"
        );

        let stats = parse(&table, &["0100007f:1f90"]).unwrap();
        assert_eq!(stats.rx_queue, 512);
        assert_eq!(stats.drops, 31);
    }

    #[test]
    fn first_match_wins() {
        let table = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0:1 00:0 0 0 0 1 2 0 1\n\
             2: 0100007F:1F90 00000000:0000 07 0:2 00:0 0 0 0 1 2 0 2\n"
        );

        assert_eq!(parse(&table, &["0100007F:1F90"]).unwrap().rx_queue, 1);
    }

    #[test]
    fn any_of_several_keys() {
        let table = format!(
            "{HEADER}\n\
             1: 0101A8C0:1F90 00000000:0000 07 0:3 00:0 0 0 0 1 2 0 4\n"
        );

        let stats = parse(&table, &["0100007F:1F90", "0101A8C0:1F90"]).unwrap();
        assert_eq!(stats, UdpSocketStats { rx_queue: 3, drops: 4 });
    }

    #[test]
    fn not_found() {
        let table = format!(
            "{HEADER}\n\
             1: 0101A8C0:1F90 00000000:0000 07 nonsense 00:0 0 0 0 1 2 0 zz\n"
        );

        let err = parse(&table, &["0100007F:1F90"]).unwrap_err();
        assert!(matches!(err, ProcNetUdpError::NotFound { .. }));
        assert_eq!(
            err.to_string(),
            "/proc/net/udp entry not found for [0100007F:1F90]"
        );
    }

    #[test]
    fn empty_keys_never_match() {
        let table = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0:3 00:0 0 0 0 1 2 0 4\n"
        );

        assert!(matches!(
            parse(&table, &[]),
            Err(ProcNetUdpError::NotFound { .. })
        ));
    }

    #[test]
    fn header_only() {
        assert!(matches!(
            parse(HEADER, &["0100007F:1F90"]),
            Err(ProcNetUdpError::NotFound { .. })
        ));
        assert!(matches!(
            parse("", &["0100007F:1F90"]),
            Err(ProcNetUdpError::NotFound { .. })
        ));
    }

    #[test]
    fn header_is_skipped() {
        // a header that happens to look like a matching row is ignored
        let table = "1: 0100007F:1F90 00000000:0000 07 0:3 00:0 0 0 0 1 2 0 4\n";

        assert!(matches!(
            parse(table, &["0100007F:1F90"]),
            Err(ProcNetUdpError::NotFound { .. })
        ));
    }

    #[test]
    fn short_lines_are_skipped() {
        let table = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0:3 00:0 0 0 0 1 2 0\n"
        );

        assert!(matches!(
            parse(&table, &["0100007F:1F90"]),
            Err(ProcNetUdpError::NotFound { .. })
        ));
    }

    #[test]
    fn malformed_fields() {
        let missing = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0000001A 00:0 0 0 0 1 2 0 4\n"
        );
        assert!(matches!(
            parse(&missing, &["0100007F:1F90"]),
            Err(ProcNetUdpError::MissingRxQueue(_))
        ));

        let rx_queue = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0:xyz 00:0 0 0 0 1 2 0 4\n"
        );
        assert!(matches!(
            parse(&rx_queue, &["0100007F:1F90"]),
            Err(ProcNetUdpError::ParseRxQueue(_))
        ));

        let drops = format!(
            "{HEADER}\n\
             1: 0100007F:1F90 00000000:0000 07 0:1 00:0 0 0 0 1 2 0 -\n"
        );
        assert!(matches!(
            parse(&drops, &["0100007F:1F90"]),
            Err(ProcNetUdpError::ParseDrops(_))
        ));
    }

    #[test]
    fn missing_file() {
        let err = proc_net_udp(
            Path::new("/this/path/does/not/exist/udp"),
            &keys(&["0100007F:1F90"]),
        )
        .unwrap_err();

        assert!(matches!(err, ProcNetUdpError::Io { .. }));
    }
}
