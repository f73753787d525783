use super::{MediaDescription, SdpConnection, SdpOrigin, SessionDescription};
use std::fmt::Write;

/// Builder for SDP session descriptions
pub struct SdpBuilder {
    sdp: SessionDescription,
    current_media: Option<MediaDescription>,
}

impl Default for SdpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn addr_type(addr: &str) -> String {
    if addr.contains(':') { "IP6" } else { "IP4" }.to_string()
}

impl SdpBuilder {
    /// Create a new SDP builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            sdp: SessionDescription::default(),
            current_media: None,
        }
    }

    /// Set origin
    #[must_use]
    pub fn origin(
        mut self,
        username: &str,
        session_id: &str,
        session_version: &str,
        addr: &str,
    ) -> Self {
        self.sdp.origin = Some(SdpOrigin {
            username: username.to_string(),
            session_id: session_id.to_string(),
            session_version: session_version.to_string(),
            net_type: "IN".to_string(),
            addr_type: addr_type(addr),
            unicast_address: addr.to_string(),
        });
        self
    }

    /// Set session name
    #[must_use]
    pub fn session_name(mut self, name: &str) -> Self {
        self.sdp.session_name = name.to_string();
        self
    }

    /// Set connection info
    #[must_use]
    pub fn connection(mut self, addr: &str) -> Self {
        self.sdp.connection = Some(SdpConnection {
            net_type: "IN".to_string(),
            addr_type: addr_type(addr),
            address: addr.to_string(),
        });
        self
    }

    /// Set timing (0 0 for live streams)
    #[must_use]
    pub fn timing(mut self, start: u64, stop: u64) -> Self {
        self.sdp.timing = Some((start, stop));
        self
    }

    /// Add session-level attribute
    #[must_use]
    pub fn attribute(mut self, name: &str, value: Option<&str>) -> Self {
        self.sdp
            .attributes
            .push((name.to_string(), value.map(String::from)));
        self
    }

    /// Start a media section
    #[must_use]
    pub fn media(mut self, media_type: &str, port: u16, protocol: &str, formats: &[&str]) -> Self {
        if let Some(media) = self.current_media.take() {
            self.sdp.media.push(media);
        }

        self.current_media = Some(MediaDescription {
            media_type: media_type.to_string(),
            port,
            protocol: protocol.to_string(),
            formats: formats.iter().map(ToString::to_string).collect(),
            attributes: Vec::new(),
        });

        self
    }

    /// Add media-level attribute
    #[must_use]
    pub fn media_attribute(mut self, name: &str, value: Option<&str>) -> Self {
        if let Some(ref mut media) = self.current_media {
            media
                .attributes
                .push((name.to_string(), value.map(String::from)));
        }
        self
    }

    /// Build the SDP
    #[must_use]
    pub fn build(mut self) -> SessionDescription {
        if let Some(media) = self.current_media.take() {
            self.sdp.media.push(media);
        }
        self.sdp
    }

    /// Build and encode as string
    #[must_use]
    pub fn encode(self) -> String {
        let sdp = self.build();
        encode_sdp(&sdp)
    }
}

fn write_attributes(output: &mut String, attributes: &[(String, Option<String>)]) {
    for (name, value) in attributes {
        // Writing to a String cannot fail
        let _ = match value {
            Some(v) => write!(output, "a={name}:{v}\r\n"),
            None => write!(output, "a={name}\r\n"),
        };
    }
}

/// Encode SDP to string format
#[must_use]
pub fn encode_sdp(sdp: &SessionDescription) -> String {
    let mut output = String::new();

    let _ = write!(output, "v={}\r\n", sdp.version);

    if let Some(ref o) = sdp.origin {
        let _ = write!(
            output,
            "o={} {} {} {} {} {}\r\n",
            o.username, o.session_id, o.session_version, o.net_type, o.addr_type, o.unicast_address
        );
    }

    let _ = write!(output, "s={}\r\n", sdp.session_name);

    if let Some(ref c) = sdp.connection {
        let _ = write!(output, "c={} {} {}\r\n", c.net_type, c.addr_type, c.address);
    }

    if let Some((start, stop)) = sdp.timing {
        let _ = write!(output, "t={start} {stop}\r\n");
    }

    write_attributes(&mut output, &sdp.attributes);

    for media in &sdp.media {
        let _ = write!(
            output,
            "m={} {} {} {}\r\n",
            media.media_type,
            media.port,
            media.protocol,
            media.formats.join(" ")
        );
        write_attributes(&mut output, &media.attributes);
    }

    output
}

/// Create RAOP ANNOUNCE SDP for Apple Lossless audio
///
/// `rsaaeskey` and `aesiv` are unpadded Base64.
#[must_use]
pub fn create_raop_announce_sdp(
    session_id: &str,
    client_ip: &str,
    server_host: &str,
    rsaaeskey: &str,
    aesiv: &str,
    frames_per_packet: u32,
    sample_rate: u32,
) -> String {
    let fmtp = format!("96 {frames_per_packet} 0 16 40 10 14 2 255 0 0 {sample_rate}");

    SdpBuilder::new()
        .origin("iTunes", session_id, "0", client_ip)
        .session_name("iTunes")
        .connection(server_host)
        .timing(0, 0)
        .media("audio", 0, "RTP/AVP", &["96"])
        .media_attribute("rtpmap", Some("96 AppleLossless"))
        .media_attribute("fmtp", Some(&fmtp))
        .media_attribute("rsaaeskey", Some(rsaaeskey))
        .media_attribute("aesiv", Some(aesiv))
        .encode()
}
