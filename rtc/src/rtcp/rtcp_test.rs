use super::*;

#[test]
fn test_pli_wire_format() {
    let pli = build_pli(0xAABBCCDD, 0x11223344).unwrap();
    assert_eq!(pli.len(), 12);
    assert_eq!(pli[0], 0x81);
    assert_eq!(pli[1], 206);
    assert_eq!(&pli[2..4], &2u16.to_be_bytes());
    assert_eq!(&pli[4..8], &0xAABBCCDDu32.to_be_bytes());
    assert_eq!(&pli[8..12], &0x11223344u32.to_be_bytes());
}

#[test]
fn test_parse_pli_round_trip() {
    let pli = build_pli(1, 2).unwrap();
    let feedback = parse_compound(&pli).unwrap();
    assert_eq!(
        feedback,
        vec![Feedback::PictureLoss {
            sender_ssrc: 1,
            media_ssrc: 2
        }]
    );
}

#[test]
fn test_parse_nack_entries() {
    let nack = build_nack(
        7,
        8,
        &[
            NackEntry {
                packet_id: 1000,
                bitmask: 0b11,
            },
            NackEntry {
                packet_id: 2000,
                bitmask: 0,
            },
        ],
    )
    .unwrap();

    let feedback = parse_compound(&nack).unwrap();
    match &feedback[0] {
        Feedback::Nack {
            sender_ssrc,
            media_ssrc,
            entries,
        } => {
            assert_eq!(*sender_ssrc, 7);
            assert_eq!(*media_ssrc, 8);
            assert_eq!(
                entries,
                &vec![
                    NackEntry {
                        packet_id: 1000,
                        bitmask: 0b11
                    },
                    NackEntry {
                        packet_id: 2000,
                        bitmask: 0
                    },
                ]
            );
        }
        other => panic!("expected nack, got {other:?}"),
    }
}

#[test]
fn test_parse_receiver_report_block() {
    let mut bs = BitStream::new();
    bs.write_bits(2, 2).unwrap();
    bs.write_bits(1, 0).unwrap();
    bs.write_bits(5, 1).unwrap(); // one report block
    bs.write_uint(1, PT_RECEIVER_REPORT as u64).unwrap();
    bs.write_uint(2, 7).unwrap(); // (7 + 1) * 4 = 32 bytes total
    bs.write_uint(4, 0xCAFE).unwrap(); // sender ssrc
    bs.write_uint(4, 0xFEED).unwrap(); // reported ssrc
    bs.write_uint(1, 3).unwrap(); // fraction lost
    bs.write_uint(3, 55).unwrap(); // cumulative lost
    bs.write_uint(4, 70_000).unwrap(); // highest sequence
    bs.write_uint(4, 12).unwrap(); // jitter
    bs.write_uint(4, 34).unwrap(); // last SR
    bs.write_uint(4, 56).unwrap(); // delay since last SR

    let feedback = parse_compound(bs.as_slice()).unwrap();
    assert_eq!(
        feedback,
        vec![Feedback::ReceiverReport(ReceiverReport {
            ssrc: 0xFEED,
            fraction_lost: 3,
            cumulative_lost: 55,
            highest_sequence: 70_000,
            jitter: 12,
            last_sr: 34,
            delay_since_last_sr: 56,
        })]
    );
}

#[test]
fn test_compound_iteration() {
    let mut compound = BytesMut::new();
    compound.extend_from_slice(&build_pli(1, 2).unwrap());
    compound.extend_from_slice(&build_nack(
        3,
        4,
        &[NackEntry {
            packet_id: 5,
            bitmask: 0,
        }],
    )
    .unwrap());

    let feedback = parse_compound(&compound).unwrap();
    assert_eq!(feedback.len(), 2);
    assert!(matches!(feedback[0], Feedback::PictureLoss { .. }));
    assert!(matches!(feedback[1], Feedback::Nack { .. }));
}

#[test]
fn test_chunk_length_beyond_buffer_stops_iteration() {
    let mut bs = BitStream::new();
    bs.write_bits(2, 2).unwrap();
    bs.write_bits(1, 0).unwrap();
    bs.write_bits(5, 1).unwrap();
    bs.write_uint(1, PT_PAYLOAD_SPECIFIC_FEEDBACK as u64).unwrap();
    bs.write_uint(2, 100).unwrap(); // claims 400 bytes that are not there
    bs.write_uint(4, 1).unwrap();
    let feedback = parse_compound(bs.as_slice()).unwrap();
    assert!(feedback.is_empty());
}
