/// Compressed audio container identified from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Mp3,
    Mp3Id3,
    Opus,
    AacAdif,
    AacAdts,
    Flac,
    Wav,
}

/// Identify a known audio container from the first bytes of a body.
/// `None` means unknown (or raw PCM), which is treated as text downstream.
pub fn identify(bytes: &[u8]) -> Option<AudioFormat> {
    if bytes.starts_with(&[0xFF, 0xFB]) || bytes.starts_with(&[0xFF, 0xF3]) {
        return Some(AudioFormat::Mp3);
    }
    if bytes.starts_with(b"ID3") {
        return Some(AudioFormat::Mp3Id3);
    }
    if bytes.starts_with(b"OpusHead") {
        return Some(AudioFormat::Opus);
    }
    if bytes.starts_with(b"ADIF") {
        return Some(AudioFormat::AacAdif);
    }
    if bytes.starts_with(&[0xFF, 0xF1]) || bytes.starts_with(&[0xFF, 0xF9]) {
        return Some(AudioFormat::AacAdts);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(AudioFormat::Flac);
    }
    if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WAVE") {
        return Some(AudioFormat::Wav);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_magics() {
        assert_eq!(identify(&[0xFF, 0xFB, 0x90]), Some(AudioFormat::Mp3));
        assert_eq!(identify(b"ID3\x04rest"), Some(AudioFormat::Mp3Id3));
        assert_eq!(identify(b"OpusHead..."), Some(AudioFormat::Opus));
        assert_eq!(identify(b"ADIF...."), Some(AudioFormat::AacAdif));
        assert_eq!(identify(&[0xFF, 0xF1, 0x00]), Some(AudioFormat::AacAdts));
        assert_eq!(identify(b"fLaC...."), Some(AudioFormat::Flac));
        assert_eq!(identify(b"RIFF\x00\x00\x00\x00WAVEfmt "), Some(AudioFormat::Wav));
    }

    #[test]
    fn unknown_prefixes() {
        assert_eq!(identify(b"RIFF\x00\x00\x00\x00AVI "), None);
        assert_eq!(identify(b"data: {\"x\":1}"), None);
        assert_eq!(identify(&[]), None);
    }
}
