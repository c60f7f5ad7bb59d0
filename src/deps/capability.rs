//! Built-in capability probes.
//!
//! Each capability maps to a POSIX sh probe script that exits 0 when the
//! capability is available. The same script runs on the host and
//! in-container; only the TTY probe special-cases the host, where asking
//! the real terminal is more truthful than asking a probe subprocess.

use is_terminal::IsTerminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Capability {
    /// Outbound internet connectivity.
    Internet,
    /// A configured local network.
    Lan,
    /// A usable container engine.
    Containers,
    /// An interactive terminal.
    Tty,
}

impl Capability {
    pub fn parse(name: &str) -> Option<Capability> {
        match name {
            "internet" => Some(Capability::Internet),
            "lan" => Some(Capability::Lan),
            "containers" => Some(Capability::Containers),
            "tty" => Some(Capability::Tty),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Internet => "internet",
            Capability::Lan => "lan",
            Capability::Containers => "containers",
            Capability::Tty => "tty",
        }
    }

    /// POSIX sh probe; exit 0 means available.
    pub fn probe_script(&self) -> &'static str {
        match self {
            Capability::Internet => {
                "ping -c 1 -W 2 1.1.1.1 >/dev/null 2>&1 || ping -c 1 -W 2 8.8.8.8 >/dev/null 2>&1"
            }
            Capability::Lan => {
                "ip route 2>/dev/null | grep -q '^default' || netstat -rn 2>/dev/null | grep -q '^default'"
            }
            Capability::Containers => {
                "command -v podman >/dev/null 2>&1 || command -v docker >/dev/null 2>&1"
            }
            Capability::Tty => "test -t 1",
        }
    }

    /// Host-side shortcut where a direct answer beats a probe subprocess.
    pub fn host_shortcut(&self) -> Option<bool> {
        match self {
            Capability::Tty => Some(std::io::stdout().is_terminal()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_capabilities_parse() {
        for name in ["internet", "lan", "containers", "tty"] {
            let cap = Capability::parse(name).unwrap();
            assert_eq!(cap.name(), name);
        }
    }

    #[test]
    fn unknown_capability_is_none() {
        assert!(Capability::parse("quantum").is_none());
    }

    #[test]
    fn probe_scripts_are_posix_one_liners() {
        for cap in [
            Capability::Internet,
            Capability::Lan,
            Capability::Containers,
            Capability::Tty,
        ] {
            assert!(!cap.probe_script().contains('\n'));
        }
    }

    #[test]
    fn tty_has_host_shortcut() {
        assert!(Capability::Tty.host_shortcut().is_some());
        assert!(Capability::Internet.host_shortcut().is_none());
    }
}
