//! OS-specific filesystem paths for the agent's persisted key/CA/cert
//! (spec §6's path table).

use nebula_core::OsType;

/// The three paths a node agent writes its PKI material to, chosen by
/// `Node.os_type`.
#[derive(Debug, Clone, Copy)]
pub struct OsPaths {
    /// Private key path.
    pub key: &'static str,
    /// CA bundle path.
    pub ca: &'static str,
    /// Host certificate path.
    pub cert: &'static str,
}

/// Resolve the path table for one platform.
#[must_use]
pub fn paths_for(os_type: OsType) -> OsPaths {
    match os_type {
        OsType::Docker | OsType::Macos => OsPaths {
            key: "/var/lib/nebula/host.key",
            ca: "/etc/nebula/ca.crt",
            cert: "/etc/nebula/host.crt",
        },
        OsType::Windows => OsPaths {
            key: "C:/ProgramData/Nebula/host.key",
            ca: "C:/ProgramData/Nebula/ca.crt",
            cert: "C:/ProgramData/Nebula/host.crt",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_and_macos_share_the_posix_path_table() {
        let docker = paths_for(OsType::Docker);
        let macos = paths_for(OsType::Macos);
        assert_eq!(docker.key, macos.key);
        assert_eq!(docker.ca, macos.ca);
        assert_eq!(docker.cert, macos.cert);
    }

    #[test]
    fn windows_uses_programdata() {
        let windows = paths_for(OsType::Windows);
        assert!(windows.key.starts_with("C:/ProgramData"));
    }
}
