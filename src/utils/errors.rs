#![forbid(unsafe_code)]

use thiserror::Error;

/// Error enumerates the errors returned by this application.
#[derive(Error, Debug)]
pub enum Errors {
    /// Input parameter logging.
    #[error("nms_server input parameters:\n{}", .0)]
    InputParms(String),

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Inaccessible logger configuration file.
    #[error("Unable to access the Log4rs configuration file: {}", .0)]
    Log4rsInitialization(String),

    #[error("Reading application configuration file: {}", .0)]
    ReadingConfigFile(String),

    #[error("Unable to parse TOML file: {}", .0)]
    TOMLParseError(String),

    /// TLS was requested but the certificate or key could not be read.
    #[error("Unable to read TLS certificate or key file: {}", .0)]
    TlsFiles(String),
}

#[cfg(test)]
mod tests {
    use super::Errors;

    #[test]
    fn messages_carry_detail() {
        let e = Errors::TOMLParseError("/tmp/nms.toml".to_string());
        assert_eq!(e.to_string(), "Unable to parse TOML file: /tmp/nms.toml");

        let e = Errors::TlsFiles("/tmp/certs/key.pem".to_string());
        assert!(e.to_string().ends_with("/tmp/certs/key.pem"));
    }

    #[test]
    fn io_errors_are_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let e: Errors = io.into();
        assert_eq!(e.to_string(), "no such file");
    }
}
