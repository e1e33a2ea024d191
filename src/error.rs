use std::fmt;

#[derive(Debug)]
pub enum CertPressError {
    MissingFont(String),
    FontNotResolved(String),
    InvalidFont(String),
    InvalidColor(String),
    InvalidTemplate(String),
    MissingField(String),
    QrEncode(String),
    Pdf(String),
    Raster(String),
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for CertPressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertPressError::MissingFont(name) => {
                write!(f, "font '{}' is not registered", name)
            }
            CertPressError::FontNotResolved(name) => {
                write!(f, "font '{}' was not resolved for this render", name)
            }
            CertPressError::InvalidFont(message) => write!(f, "invalid font: {}", message),
            CertPressError::InvalidColor(message) => write!(f, "invalid color: {}", message),
            CertPressError::InvalidTemplate(message) => {
                write!(f, "invalid template: {}", message)
            }
            CertPressError::MissingField(name) => {
                write!(f, "no value bound for '{}'", name)
            }
            CertPressError::QrEncode(message) => write!(f, "qr encoding failed: {}", message),
            CertPressError::Pdf(message) => write!(f, "pdf error: {}", message),
            CertPressError::Raster(message) => write!(f, "raster error: {}", message),
            CertPressError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            CertPressError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for CertPressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CertPressError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CertPressError {
    fn from(value: std::io::Error) -> Self {
        CertPressError::Io(value)
    }
}
