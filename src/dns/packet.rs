use bitstream_io::{BigEndian, BitReader, BitWriter};

use super::{DNSHeader, DNSQuestion, DNSResource, ParseError, common::PacketComponent};

/// A full wire-format message: header, question section, and the three RR
/// sections. EDNS pseudo-records are carried as ordinary additional-section
/// `DNSResource`s with `rtype == OPT`, matching the teacher's flattened
/// representation rather than hoisting EDNS into its own field.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DNSPacket {
    pub header: DNSHeader,
    pub questions: Vec<DNSQuestion>,
    pub answers: Vec<DNSResource>,
    pub authorities: Vec<DNSResource>,
    pub additionals: Vec<DNSResource>,
}

impl DNSPacket {
    pub fn parse(buf: &[u8]) -> Result<Self, ParseError> {
        let mut reader = BitReader::endian(buf, BigEndian);
        let mut header = DNSHeader::default();
        header.read(&mut reader)?;

        let mut questions = Vec::with_capacity(header.qdcount as usize);
        for _ in 0..header.qdcount {
            let mut q = DNSQuestion::default();
            q.read_with_buffer(&mut reader, buf)?;
            questions.push(q);
        }

        let mut answers = Vec::with_capacity(header.ancount as usize);
        for _ in 0..header.ancount {
            let mut rr = DNSResource::default();
            rr.read_with_buffer(&mut reader, buf)?;
            answers.push(rr);
        }

        let mut authorities = Vec::with_capacity(header.nscount as usize);
        for _ in 0..header.nscount {
            let mut rr = DNSResource::default();
            rr.read_with_buffer(&mut reader, buf)?;
            authorities.push(rr);
        }

        let mut additionals = Vec::with_capacity(header.arcount as usize);
        for _ in 0..header.arcount {
            let mut rr = DNSResource::default();
            rr.read_with_buffer(&mut reader, buf)?;
            additionals.push(rr);
        }

        Ok(DNSPacket {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = Vec::new();
        let mut header = self.header.clone();
        header.qdcount = self.questions.len() as u16;
        header.ancount = self.answers.len() as u16;
        header.nscount = self.authorities.len() as u16;
        header.arcount = self.additionals.len() as u16;

        let mut writer = BitWriter::endian(&mut buf, BigEndian);
        header.write(&mut writer)?;
        for q in &self.questions {
            q.write(&mut writer)?;
        }
        for rr in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            rr.write(&mut writer)?;
        }
        drop(writer);
        Ok(buf)
    }

    pub fn record_count(&self) -> usize {
        self.answers.len() + self.authorities.len() + self.additionals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::enums::{DNSResourceClass, DNSResourceType};

    #[test]
    fn round_trips_a_simple_query() {
        let packet = DNSPacket {
            header: DNSHeader {
                id: 0x1234,
                rd: true,
                ..Default::default()
            },
            questions: vec![DNSQuestion {
                labels: vec!["example".into(), "com".into()],
                qtype: DNSResourceType::A,
                qclass: DNSResourceClass::IN,
            }],
            ..Default::default()
        };
        let bytes = packet.to_bytes().unwrap();
        let decoded = DNSPacket::parse(&bytes).unwrap();
        assert_eq!(decoded.header.id, 0x1234);
        assert_eq!(decoded.questions.len(), 1);
        assert_eq!(decoded.questions[0].labels, vec!["example", "com"]);
    }
}
