use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::PacketComponent,
    enums::{DNSResourceClass, DNSResourceType},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DNSQuestion {
    pub labels: Vec<String>,
    pub qtype: DNSResourceType,
    pub qclass: DNSResourceClass,
}

impl PacketComponent for DNSQuestion {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.qtype.to_u16())?;
        writer.write_var::<u16>(16, self.qclass.to_u16())?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        let labels = self.read_labels(reader)?;
        let qtype = DNSResourceType::from_u16(reader.read_var::<u16>(16)?);
        let qclass = DNSResourceClass::from_u16(reader.read_var::<u16>(16)?);
        *self = DNSQuestion {
            labels,
            qtype,
            qclass,
        };
        Ok(())
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        let labels = self.read_labels_with_buffer(reader, Some(packet_buf))?;
        let qtype = DNSResourceType::from_u16(reader.read_var::<u16>(16)?);
        let qclass = DNSResourceClass::from_u16(reader.read_var::<u16>(16)?);
        *self = DNSQuestion {
            labels,
            qtype,
            qclass,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_wire() {
        let q = DNSQuestion {
            labels: vec!["example".into(), "com".into()],
            qtype: DNSResourceType::A,
            qclass: DNSResourceClass::IN,
        };
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::endian(&mut buf, bitstream_io::BigEndian);
            q.write(&mut writer).unwrap();
        }
        let mut reader = BitReader::endian(buf.as_slice(), bitstream_io::BigEndian);
        let mut decoded = DNSQuestion::default();
        decoded.read(&mut reader).unwrap();
        assert_eq!(decoded, q);
    }
}
