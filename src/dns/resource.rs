use bitstream_io::{BitRead, BitReader, BitWrite, BitWriter, Endianness};

use super::{
    ParseError,
    common::PacketComponent,
    enums::{DNSResourceClass, DNSResourceType},
};

/// A resource record as it appears on the wire. `rdata` is always the raw
/// rdata bytes (compression pointers inside rdata already expanded to
/// absolute label sequences by the zone layer when it re-encodes for a given
/// response — see `zone::rrset::RdataRecord`); this type only knows how to
/// read/write the outer RR framing.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DNSResource {
    pub labels: Vec<String>,
    pub rtype: DNSResourceType,
    pub rclass: DNSResourceClass,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl PacketComponent for DNSResource {
    fn write<E: Endianness>(
        &self,
        writer: &mut BitWriter<&mut Vec<u8>, E>,
    ) -> Result<(), ParseError> {
        self.write_labels(writer, &self.labels)?;
        writer.write_var::<u16>(16, self.rtype.to_u16())?;
        writer.write_var::<u16>(16, self.rclass.to_u16())?;
        writer.write_var::<u32>(32, self.ttl)?;
        writer.write_var::<u16>(16, self.rdata.len() as u16)?;
        writer.write_bytes(&self.rdata)?;
        Ok(())
    }

    fn read<E: Endianness>(&mut self, reader: &mut BitReader<&[u8], E>) -> Result<(), ParseError> {
        let labels = self.read_labels(reader)?;
        self.finish_read(reader, labels)
    }

    fn read_with_buffer<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        packet_buf: &[u8],
    ) -> Result<(), ParseError> {
        let labels = self.read_labels_with_buffer(reader, Some(packet_buf))?;
        self.finish_read(reader, labels)
    }
}

impl DNSResource {
    fn finish_read<E: Endianness>(
        &mut self,
        reader: &mut BitReader<&[u8], E>,
        labels: Vec<String>,
    ) -> Result<(), ParseError> {
        let rtype = DNSResourceType::from_u16(reader.read_var::<u16>(16)?);
        let rclass = DNSResourceClass::from_u16(reader.read_var::<u16>(16)?);
        let ttl = reader.read_var::<u32>(32)?;
        let rdlength = reader.read_var::<u16>(16)?;
        let mut rdata = vec![0u8; rdlength as usize];
        reader.read_bytes(&mut rdata)?;
        *self = DNSResource {
            labels,
            rtype,
            rclass,
            ttl,
            rdata,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_record() {
        let rr = DNSResource {
            labels: vec!["www".into(), "example".into(), "com".into()],
            rtype: DNSResourceType::A,
            rclass: DNSResourceClass::IN,
            ttl: 3600,
            rdata: vec![192, 0, 2, 1],
        };
        let mut buf = Vec::new();
        {
            let mut writer = BitWriter::endian(&mut buf, bitstream_io::BigEndian);
            rr.write(&mut writer).unwrap();
        }
        let mut reader = BitReader::endian(buf.as_slice(), bitstream_io::BigEndian);
        let mut decoded = DNSResource::default();
        decoded.read(&mut reader).unwrap();
        assert_eq!(decoded, rr);
    }
}
