use fuf_core::{parse_from_buffer, UpdateManifest, OB_RAW_SIZE_BYTES};
use proptest::collection::vec;
use proptest::prelude::*;

// Text values: no surrounding whitespace, no newlines.
fn text_value() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./-]{1,24}"
}

fn ob_bytes() -> impl Strategy<Value = Vec<u8>> {
    vec(any::<u8>(), OB_RAW_SIZE_BYTES)
}

prop_compose! {
    fn full_manifest()(
        version in text_value(),
        target in any::<u32>(),
        loader in text_value(),
        loader_crc in any::<u32>(),
        firmware in text_value(),
        radio in text_value(),
        radio_address in 1..=u32::MAX,
        radio_version in any::<[u8; 6]>(),
        radio_crc in 1..=u32::MAX,
        resources in text_value(),
        splash in text_value(),
        ob in (ob_bytes(), ob_bytes(), ob_bytes()),
        hex_numbers in any::<bool>(),
    ) -> (String, Vec<(&'static str, String)>, [Vec<u8>; 3]) {
        let num = |v: u32| if hex_numbers { format!("0x{v:x}") } else { v.to_string() };
        let rv = radio_version.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(".");
        let fields = vec![
            ("version", version),
            ("staged_loader_file", loader),
            ("firmware_dfu_image", firmware),
            ("radio_image", radio),
            ("resource_bundle", resources),
            ("splash_file", splash),
            ("target", target.to_string()),
            ("staged_loader_crc", loader_crc.to_string()),
            ("radio_address", radio_address.to_string()),
            ("radio_crc", radio_crc.to_string()),
            ("radio_version", rv.clone()),
        ];
        let text = format!(
            "manifest_version=1\nversion={}\ntarget={}\nstaged_loader_file={}\nstaged_loader_crc={}\nfirmware_dfu_image={}\nradio_image={}\nradio_address={}\nradio_version={}\nradio_crc={}\nresource_bundle={}\nob_reference={}\nob_compare_mask={}\nob_write_mask={}\nsplash_file={}\n",
            fields[0].1, num(target), fields[1].1, num(loader_crc), fields[2].1, fields[3].1,
            num(radio_address), rv, num(radio_crc), fields[4].1,
            hex::encode_upper(&ob.0), hex::encode_upper(&ob.1), hex::encode_upper(&ob.2), fields[5].1,
        );
        (text, fields, [ob.0, ob.1, ob.2])
    }
}

fn field(m: &UpdateManifest, name: &str) -> String {
    match name {
        "version" => m.version.clone(),
        "staged_loader_file" => m.staged_loader_file.clone(),
        "firmware_dfu_image" => m.firmware_dfu_image.clone(),
        "radio_image" => m.radio_image.clone(),
        "resource_bundle" => m.resource_bundle.clone(),
        "splash_file" => m.splash_file.clone(),
        "target" => m.target.to_string(),
        "staged_loader_crc" => m.staged_loader_crc.to_string(),
        "radio_address" => m.radio_address.to_string(),
        "radio_crc" => m.radio_crc.to_string(),
        "radio_version" => m.radio_version.to_string(),
        other => panic!("unknown field {other}"),
    }
}

proptest! {
    #[test]
    fn every_supplied_value_comes_back((text, fields, ob) in full_manifest()) {
        let m = parse_from_buffer(text.as_bytes());
        prop_assert!(m.is_valid());
        prop_assert!(m.has_option_byte_data());
        for (name, want) in &fields {
            prop_assert_eq!(&field(&m, name), want, "field {}", name);
        }
        prop_assert_eq!(m.ob_reference.as_bytes(), &ob[0][..]);
        prop_assert_eq!(m.ob_compare_mask.as_bytes(), &ob[1][..]);
        prop_assert_eq!(m.ob_write_mask.as_bytes(), &ob[2][..]);
    }

    #[test]
    fn render_then_parse_is_stable((text, _fields, _ob) in full_manifest()) {
        let m = parse_from_buffer(text.as_bytes());
        let again = parse_from_buffer(m.render().as_bytes());
        prop_assert_eq!(again, m);
    }

    #[test]
    fn line_order_does_not_matter((text, _fields, _ob) in full_manifest(), seed in any::<u64>()) {
        let mut lines: Vec<&str> = text.lines().collect();
        // Deterministic shuffle driven by the generated seed.
        let mut s = seed | 1;
        for i in (1..lines.len()).rev() {
            s ^= s << 13;
            s ^= s >> 7;
            s ^= s << 17;
            lines.swap(i, (s % (i as u64 + 1)) as usize);
        }
        let shuffled = lines.join("\n");
        prop_assert_eq!(parse_from_buffer(shuffled.as_bytes()), parse_from_buffer(text.as_bytes()));
    }

    #[test]
    fn reuse_equals_fresh_parse((a, _fa, _oa) in full_manifest(), firmware in text_value()) {
        let b = format!("manifest_version=1\nfirmware_dfu_image={firmware}\n");
        let mut reused = parse_from_buffer(a.as_bytes());
        reused.load_bytes(b.as_bytes()).unwrap();
        prop_assert_eq!(reused, parse_from_buffer(b.as_bytes()));
    }

    #[test]
    fn no_artifact_never_validates(version in text_value(), target in any::<u32>()) {
        let text = format!("manifest_version=1\nversion={version}\ntarget={target}\n");
        prop_assert!(!parse_from_buffer(text.as_bytes()).is_valid());
    }

    #[test]
    fn unsupported_version_never_validates(v in 2..=u32::MAX, firmware in text_value()) {
        let text = format!("manifest_version={v}\nfirmware_dfu_image={firmware}\n");
        prop_assert!(!parse_from_buffer(text.as_bytes()).is_valid());
    }

    #[test]
    fn two_of_three_option_bytes_never_validate(skip in 0usize..3, ob in ob_bytes()) {
        let keys = ["ob_reference", "ob_compare_mask", "ob_write_mask"];
        let mut text = String::from("manifest_version=1\nfirmware_dfu_image=fw.dfu\n");
        for (i, k) in keys.iter().enumerate() {
            if i != skip {
                text.push_str(&format!("{k}={}\n", hex::encode_upper(&ob)));
            }
        }
        let m = parse_from_buffer(text.as_bytes());
        prop_assert!(!m.is_valid());
        prop_assert!(m.has_option_byte_data());
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in vec(any::<u8>(), 0..512)) {
        let _ = parse_from_buffer(&data);
    }
}
