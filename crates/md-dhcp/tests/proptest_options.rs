use std::net::Ipv4Addr;

use proptest::prelude::*;

use md_dhcp::options::{self, OPT_MSG_TYPE, OPT_REQUESTED_IP, OPTIONS_LEN, OptionIter};
use md_dhcp::{DhcpMessage, Dispatcher, Interface, LeaseTable};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_FIXED_HEADER_SIZE: usize = 240;

fn valid_header() -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 1;
    packet[1] = 1;
    packet[2] = 6;
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

fn dispatcher() -> Dispatcher {
    let interface = Interface {
        address: Ipv4Addr::new(10, 1, 0, 1),
        netmask: Ipv4Addr::new(255, 255, 0, 0),
        gateway: Ipv4Addr::new(10, 1, 0, 1),
    };
    let table = LeaseTable::new(Ipv4Addr::new(10, 1, 0, 10), 3, 600).unwrap();
    Dispatcher::new(table, interface, None)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(5000))]

    #[test]
    fn option_iter_stays_in_bounds(data in prop::collection::vec(any::<u8>(), 0..400)) {
        let base = data.as_ptr() as usize;
        let mut total = 0usize;
        for opt in OptionIter::new(&data) {
            let start = opt.value.as_ptr() as usize - base;
            prop_assert!(start + opt.value.len() <= data.len());
            total += 2 + opt.value.len();
        }
        prop_assert!(total <= data.len());
    }

    #[test]
    fn find_option_honours_expected_len(
        data in prop::collection::vec(any::<u8>(), 0..400),
        code in 1u8..255,
        len in 0usize..8,
    ) {
        if let Some(value) = options::find_option(&data, code, len) {
            prop_assert_eq!(value.len(), len);
        }
    }

    #[test]
    fn oversized_length_hides_later_options(claimed in 12u8..=255) {
        // option 12 claims more bytes than remain, so the 53/50 after it are never seen
        let mut buf = vec![0u8; 12];
        buf[0] = 12;
        buf[1] = claimed;
        buf[2..5].copy_from_slice(&[OPT_MSG_TYPE, 1, 3]);
        buf[5..11].copy_from_slice(&[OPT_REQUESTED_IP, 4, 10, 1, 0, 10]);
        prop_assert_eq!(options::find_option(&buf, OPT_MSG_TYPE, 1), None);
        prop_assert_eq!(options::find_ipv4(&buf, OPT_REQUESTED_IP), None);
    }

    #[test]
    fn dispatcher_never_panics(
        options_data in prop::collection::vec(any::<u8>(), 0..OPTIONS_LEN + 64),
        mac in any::<[u8; 6]>(),
    ) {
        let mut packet = valid_header();
        packet[28..34].copy_from_slice(&mac);
        packet.extend_from_slice(&options_data);

        let mut d = dispatcher();
        let msg = DhcpMessage::parse(&packet).unwrap();
        if let Some(reply) = d.handle(msg) {
            prop_assert_eq!(reply.op, 2);
            prop_assert!(d.table().lookup(reply.hw_addr()).is_some());
        }
        prop_assert!(d.table().bound_count() <= 1);
    }
}
