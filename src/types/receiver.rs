/// Receiver audio output kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JackKind {
    /// Analog line out
    Analog,
    /// Digital (optical) out
    #[default]
    Digital,
}

/// Audio jack status reported in the SETUP reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JackStatus {
    /// Whether anything is plugged in
    pub connected: bool,
    /// Output kind
    pub kind: JackKind,
}

impl Default for JackStatus {
    fn default() -> Self {
        Self {
            connected: true,
            kind: JackKind::Digital,
        }
    }
}

impl JackStatus {
    /// Parse a header value such as `connected; type=analog`
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut status = Self {
            connected: false,
            kind: JackKind::Analog,
        };

        for token in value.split(';').map(str::trim) {
            match token.split_once('=') {
                Some(("type", "digital")) => status.kind = JackKind::Digital,
                Some(("type", _)) => status.kind = JackKind::Analog,
                Some(_) => {}
                None if token == "connected" => status.connected = true,
                None => {}
            }
        }

        status
    }
}
