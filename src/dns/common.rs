use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::ParseError;

/// Shared wire encode/decode contract for packet sections.
pub trait PacketComponent {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError>;
    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError>;

    /// Read with access to the full packet buffer for compression support
    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        _packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        self.read(reader)
    }

    fn read_labels<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
    ) -> Result<Vec<String>, ParseError> {
        self.read_labels_with_buffer(reader, None)
    }

    /// Reads a dname, following compression pointers when `packet_buf` is given.
    fn read_labels_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: Option<&[u8]>,
    ) -> Result<Vec<String>, ParseError> {
        let mut labels = Vec::new();
        loop {
            let first_byte = reader.read_var::<u8>(8)?;

            if first_byte == 0 {
                break;
            }

            if first_byte & 0xC0 == 0xC0 {
                let second_byte = reader.read_var::<u8>(8)?;
                let pointer = ((first_byte as u16 & 0x3F) << 8) | second_byte as u16;
                let buf = packet_buf.ok_or(ParseError::InvalidLabel)?;
                let mut tail = read_labels_at(buf, pointer as usize)?;
                labels.append(&mut tail);
                break;
            }

            if first_byte > 63 {
                return Err(ParseError::InvalidLabel);
            }

            let mut label_buf = vec![0u8; first_byte as usize];
            reader.read_bytes(&mut label_buf)?;
            let label = String::from_utf8(label_buf).map_err(|_| ParseError::InvalidLabel)?;
            labels.push(label);

            if labels.len() > 127 {
                return Err(ParseError::InvalidLabel);
            }
        }
        Ok(labels)
    }

    fn write_labels<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
        labels: &[String],
    ) -> Result<(), ParseError> {
        for label in labels {
            if label.is_empty() {
                continue;
            }
            if label.len() > 63 {
                return Err(ParseError::InvalidLabel);
            }
            writer.write_var::<u8>(8, label.len() as u8)?;
            writer.write_bytes(label.as_bytes())?;
        }
        writer.write_var::<u8>(8, 0)?;
        Ok(())
    }
}

/// Resolves a dname at a fixed offset into an already-materialized buffer;
/// used to follow a single compression pointer without chasing loops.
fn read_labels_at(buf: &[u8], mut offset: usize) -> Result<Vec<String>, ParseError> {
    let mut labels = Vec::new();
    let mut jumps = 0usize;
    loop {
        let len = *buf.get(offset).ok_or(ParseError::InvalidLabel)? as usize;
        if len == 0 {
            break;
        }
        if len & 0xC0 == 0xC0 {
            let lo = *buf.get(offset + 1).ok_or(ParseError::InvalidLabel)? as usize;
            offset = ((len & 0x3F) << 8) | lo;
            jumps += 1;
            if jumps > 16 {
                return Err(ParseError::InvalidLabel);
            }
            continue;
        }
        let start = offset + 1;
        let end = start + len;
        let bytes = buf.get(start..end).ok_or(ParseError::InvalidLabel)?;
        labels.push(String::from_utf8_lossy(bytes).to_string());
        offset = end;
    }
    Ok(labels)
}
