// tests/section_file.rs
//! End-to-end round trips between the three representations, against
//! byte-exact reference sections (CRCs included).

use mpegts_tables::constants::{PID_NIT, TID_PAT, TID_PMT};
use mpegts_tables::desc::Descriptor;
use mpegts_tables::psi::{Pat, PsiTable, Tdt};
use mpegts_tables::{BinaryTable, CrcPolicy, Section, SectionFile, SiContext, SiError};

/// PAT: ts_id 0x0001, version 0, NIT on 0x0010, programs 1-4.
const PAT1_SECTIONS: &[u8] = &[
    0x00, 0xB0, 0x1D, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x00, 0xE0, 0x10, 0x00, 0x01, 0xE1,
    0x00, 0x00, 0x02, 0xE2, 0x00, 0x00, 0x03, 0xE3, 0x00, 0x00, 0x04, 0xE4, 0x00, 0x51, 0x76,
    0x4C, 0xE1,
];

const PAT1_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<tsduck>\n\
\x20 <pat version=\"0\" current=\"true\" transport_stream_id=\"0x0001\" network_pid=\"0x0010\">\n\
\x20   <service service_id=\"0x0001\" program_map_pid=\"0x0100\"/>\n\
\x20   <service service_id=\"0x0002\" program_map_pid=\"0x0200\"/>\n\
\x20   <service service_id=\"0x0003\" program_map_pid=\"0x0300\"/>\n\
\x20   <service service_id=\"0x0004\" program_map_pid=\"0x0400\"/>\n\
\x20 </pat>\n\
</tsduck>\n";

/// PMT with an SCTE-35 splice stream: service 0x0065, PCR 0x00C8,
/// "CUEI" registration at program level.
const PMT_SCTE35_SECTIONS: &[u8] = &[
    0x02, 0xB0, 0x1D, 0x00, 0x65, 0xC3, 0x00, 0x00, 0xE0, 0xC8, 0xF0, 0x06, 0x05, 0x04, 0x43,
    0x55, 0x45, 0x49, 0x1B, 0xE0, 0xC8, 0xF0, 0x00, 0x86, 0xE0, 0xC9, 0xF0, 0x00, 0x9B, 0x42,
    0x5C, 0xC7,
];

const PMT_SCTE35_XML: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<tsduck>\n\
\x20 <pmt version=\"1\" current=\"true\" service_id=\"0x0065\" pcr_pid=\"0x00C8\">\n\
\x20   <registration_descriptor format_identifier=\"0x43554549\"/>\n\
\x20   <component elementary_pid=\"0x00C8\" stream_type=\"0x1B\"/>\n\
\x20   <component elementary_pid=\"0x00C9\" stream_type=\"0x86\"/>\n\
\x20 </pmt>\n\
</tsduck>\n";

fn check_reference(xml: &str, sections: &[u8]) {
    let ctx = SiContext::default();

    // XML → sections must match the reference bytes, CRCs included
    let mut file = SectionFile::new(ctx);
    file.parse_xml(xml).unwrap();
    let mut bytes = Vec::new();
    file.save_buffer(&mut bytes);
    assert_eq!(bytes, sections);

    // and back: sections → XML must reproduce the document
    assert_eq!(file.to_xml_string(), xml);

    let mut reloaded = SectionFile::new(ctx);
    reloaded.load_buffer(sections, 0, sections.len()).unwrap();
    assert_eq!(reloaded.to_xml_string(), xml);
    let mut again = Vec::new();
    reloaded.save_buffer(&mut again);
    assert_eq!(again, sections);
}

#[test]
fn test_pat1_reference() {
    check_reference(PAT1_XML, PAT1_SECTIONS);
}

#[test]
fn test_pmt_scte35_reference() {
    check_reference(PMT_SCTE35_XML, PMT_SCTE35_SECTIONS);
}

#[test]
fn test_build_sections() {
    let ctx = SiContext::default();

    // PAT with programs 3..=305 → PIDs 5..=307, two sections
    let mut pat = Pat::new(7, true, 0x1234);
    assert_eq!(pat.nit_pid, PID_NIT);
    for srv in 3u16..306 {
        pat.pmts.insert(srv, srv + 2);
    }
    let mut pat_bin = BinaryTable::new();
    pat.serialize(&ctx, &mut pat_bin).unwrap();
    assert!(pat_bin.is_valid());
    assert_eq!(pat_bin.section_count(), 2);

    let mut file = SectionFile::new(ctx);
    file.add_table(pat_bin.clone()).unwrap();
    assert_eq!(file.tables_count(), 1);
    assert_eq!(file.sections_count(), 2);
    assert_eq!(file.orphan_sections().len(), 0);

    file.add_section(pat_bin.section_at(0).unwrap().clone());
    assert_eq!(file.tables_count(), 1);
    assert_eq!(file.sections_count(), 3);
    assert_eq!(file.orphan_sections().len(), 1);

    file.add_section(pat_bin.section_at(1).unwrap().clone());
    assert_eq!(file.tables_count(), 2);
    assert_eq!(file.sections_count(), 4);
    assert_eq!(file.orphan_sections().len(), 0);

    // one TDT, a single short section
    let when = chrono::NaiveDate::from_ymd_opt(2017, 12, 25)
        .unwrap()
        .and_hms_opt(14, 55, 27)
        .unwrap();
    let tdt = Tdt::new(when);
    let mut tdt_bin = BinaryTable::new();
    tdt.serialize(&ctx, &mut tdt_bin).unwrap();
    assert!(tdt_bin.is_valid());
    assert_eq!(tdt_bin.section_count(), 1);
    assert_eq!(
        tdt_bin.section_at(0).unwrap().as_bytes(),
        &[0x70, 0x70, 0x05, 0xE3, 0x00, 0x14, 0x55, 0x27]
    );
    file.add_table(tdt_bin).unwrap();
    assert_eq!(file.tables_count(), 3);
    assert_eq!(file.sections_count(), 5);

    // reload through the binary path
    let mut bytes = Vec::new();
    file.save_buffer(&mut bytes);
    let mut bin_file = SectionFile::new(ctx);
    bin_file.set_crc_validation(CrcPolicy::Check);
    bin_file.load_buffer(&bytes, 0, bytes.len()).unwrap();
    assert_eq!(bin_file.tables_count(), 3);
    assert_eq!(bin_file.sections_count(), 5);
    assert_eq!(bin_file.orphan_sections().len(), 0);

    // reload through the XML path
    let mut xml_file = SectionFile::new(ctx);
    xml_file.parse_xml(&file.to_xml_string()).unwrap();
    assert_eq!(xml_file.tables_count(), 3);
    assert_eq!(xml_file.sections_count(), 5);

    for (a, b) in file.tables().iter().zip(bin_file.tables()) {
        assert_eq!(a, b);
    }
    for (a, b) in file.tables().iter().zip(xml_file.tables()) {
        assert_eq!(a, b);
    }

    // both reconstructions expose the original PAT
    for reconstructed in [&bin_file, &xml_file] {
        let back = Pat::from_binary(&ctx, &reconstructed.tables()[0]);
        assert!(back.is_valid());
        assert_eq!(back.version, 7);
        assert_eq!(back.ts_id, 0x1234);
        assert_eq!(back.nit_pid, PID_NIT);
        assert_eq!(back.pmts, pat.pmts);
    }

    let back = Tdt::from_binary(&ctx, &bin_file.tables()[2]);
    assert_eq!(back.utc_time, when);
    let back = Tdt::from_binary(&ctx, &xml_file.tables()[2]);
    assert_eq!(back.utc_time, when);
}

#[test]
fn test_generic_short_table() {
    let ctx = SiContext::default();
    let mut file = SectionFile::new(ctx);
    file.parse_xml(
        "<tsduck>\n\
         \x20 <generic_short_table table_id=\"0xAB\" private=\"false\">\n\
         \x20   01 02 03 04 05 06\n\
         \x20 </generic_short_table>\n\
         </tsduck>",
    )
    .unwrap();
    assert_eq!(file.tables_count(), 1);
    let table = &file.tables()[0];
    assert!(table.is_valid());
    assert!(table.is_short_section());
    assert!(!table.is_long_section());
    assert_eq!(table.table_id(), 0xAB);
    assert_eq!(table.section_count(), 1);
    let sec = table.section_at(0).unwrap();
    assert!(!sec.is_private_section());
    assert_eq!(sec.payload(), &[1, 2, 3, 4, 5, 6]);

    // forced generic emission round-trips
    let elem = table.to_xml(&ctx, true);
    assert_eq!(elem.name(), "generic_short_table");
    let back = BinaryTable::from_xml(&ctx, &elem).unwrap();
    assert_eq!(&back, table);
}

#[test]
fn test_generic_long_table_case_insensitive() {
    let ctx = SiContext::default();
    let mut file = SectionFile::new(ctx);
    file.parse_xml(
        "<tsduck>\n\
         <GENERIC_long_TABLE table_id=\"0xCD\" table_id_ext=\"0x1234\" version=\"7\" \
         current=\"true\" private=\"true\">\n\
         <section> 01 02 03 04 05 </section>\n\
         <SECTION> 11 12 13 14 </SECTION>\n\
         </GENERIC_long_TABLE>\n\
         </tsduck>",
    )
    .unwrap();
    assert_eq!(file.tables_count(), 1);
    let table = &file.tables()[0];
    assert!(table.is_valid());
    assert!(table.is_long_section());
    assert_eq!(table.table_id(), 0xCD);
    assert_eq!(table.table_id_extension(), 0x1234);
    assert_eq!(table.section_count(), 2);

    for (i, payload) in [&[1u8, 2, 3, 4, 5][..], &[0x11, 0x12, 0x13, 0x14][..]]
        .iter()
        .enumerate()
    {
        let sec = table.section_at(i).unwrap();
        assert!(sec.is_valid());
        assert_eq!(sec.table_id(), 0xCD);
        assert_eq!(sec.table_id_extension(), 0x1234);
        assert_eq!(sec.version(), 7);
        assert!(sec.is_current());
        assert!(sec.is_private_section());
        assert!(!sec.is_short_section());
        assert_eq!(sec.section_number(), i as u8);
        assert_eq!(sec.last_section_number(), 1);
        assert_eq!(sec.payload(), *payload);
    }
}

#[test]
fn test_generic_descriptor_document() {
    // a free-standing descriptor dump inside a generic table payload
    let desc = Descriptor::new(0x72, vec![1, 2, 3, 4, 5, 6, 7]).unwrap();
    let ctx = SiContext::default();
    let elem = desc.to_xml(&mpegts_tables::desc::DescriptorContext::new(&ctx, 0xFF));
    let text = elem.to_document_string();
    assert_eq!(
        text,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <generic_descriptor tag=\"0x72\">\n\
         \x20 01 02 03 04 05 06 07\n\
         </generic_descriptor>\n"
    );
    let parsed = mpegts_tables::xml::parse_document(&text).unwrap();
    let back = Descriptor::from_xml(&parsed).unwrap();
    assert_eq!(back, desc);
}

#[test]
fn test_memory_buffer_with_offsets() {
    let ctx = SiContext::default();
    let mut input = vec![0u8; 5];
    input.extend_from_slice(PAT1_SECTIONS);
    input.extend_from_slice(PMT_SCTE35_SECTIONS);
    input.extend_from_slice(&[0, 0, 0]);
    let payload_len = PAT1_SECTIONS.len() + PMT_SCTE35_SECTIONS.len();
    assert_eq!(input.len(), 5 + payload_len + 3);

    let mut file = SectionFile::new(ctx);
    file.load_buffer(&input, 5, payload_len).unwrap();
    assert_eq!(file.binary_size(), payload_len);
    assert_eq!(file.sections_count(), 2);
    assert_eq!(file.tables_count(), 2);
    assert_eq!(file.tables()[0].table_id(), TID_PAT);
    assert_eq!(file.tables()[1].table_id(), TID_PMT);

    // appending after a reserved prefix
    let mut output = vec![0u8; 3];
    assert_eq!(file.save_buffer(&mut output), payload_len);
    assert_eq!(output.len(), 3 + payload_len);
    assert_eq!(&output[3..3 + PAT1_SECTIONS.len()], PAT1_SECTIONS);
    assert_eq!(&output[3 + PAT1_SECTIONS.len()..], PMT_SCTE35_SECTIONS);

    // a short destination takes only the sections that fit whole
    let mut small = [0u8; 40];
    assert_eq!(file.save_buffer_slice(&mut small), PAT1_SECTIONS.len());
    assert_eq!(&small[..PAT1_SECTIONS.len()], PAT1_SECTIONS);

    let mut big = [0u8; 100];
    assert_eq!(file.save_buffer_slice(&mut big), payload_len);
    assert_eq!(&big[..PAT1_SECTIONS.len()], PAT1_SECTIONS);
    assert_eq!(&big[PAT1_SECTIONS.len()..payload_len], PMT_SCTE35_SECTIONS);
}

#[test]
fn test_metadata_attribute_propagation() {
    let ctx = SiContext::default();
    let xmlref = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<tsduck>\n\
\x20 <pat version=\"0\" current=\"true\" transport_stream_id=\"0x0001\" network_pid=\"0x0010\">\n\
\x20   <metadata attribute=\"foo\"/>\n\
\x20   <service service_id=\"0x0100\" program_map_pid=\"0x0200\"/>\n\
\x20 </pat>\n\
</tsduck>\n";

    let root = mpegts_tables::xml::parse_document(xmlref).unwrap();
    let pat_elem = root.children().next().unwrap();

    let table = BinaryTable::from_xml(&ctx, pat_elem).unwrap();
    assert!(table.is_valid());
    assert_eq!(table.table_id(), TID_PAT);
    assert_eq!(table.attribute(), "foo");
    assert_eq!(table.section_count(), 1);
    assert_eq!(table.section_at(0).unwrap().attribute(), "foo");

    let pat = Pat::from_binary(&ctx, &table);
    assert!(pat.is_valid());
    assert_eq!(pat.ts_id, 1);
    assert_eq!(pat.nit_pid, PID_NIT);
    assert_eq!(pat.pmts.get(&0x100), Some(&0x200));
    assert_eq!(pat.attribute(), "foo");

    // attribute survives typed re-serialization and copies
    let mut table2 = BinaryTable::new();
    pat.serialize(&ctx, &mut table2).unwrap();
    assert!(table2.is_valid());
    assert_eq!(table2.attribute(), "foo");
    let pat2 = pat.clone();
    assert_eq!(pat2.attribute(), "foo");
    let table3 = table.clone();
    assert_eq!(table3.attribute(), "foo");

    // and is emitted back as the first child
    let mut file = SectionFile::new(ctx);
    file.parse_xml(xmlref).unwrap();
    assert_eq!(file.to_xml_string(), xmlref);
}

#[test]
fn test_crc_policy_on_corrupt_section() {
    let mut corrupt = PAT1_SECTIONS.to_vec();
    corrupt[10] ^= 0x01; // flip one payload byte

    let ctx = SiContext::default();
    let mut checked = SectionFile::new(ctx);
    checked.set_crc_validation(CrcPolicy::Check);
    assert!(matches!(
        checked.load_buffer(&corrupt, 0, corrupt.len()),
        Err(SiError::BadCrc { .. })
    ));

    let mut tolerant = SectionFile::new(ctx);
    tolerant.set_crc_validation(CrcPolicy::Ignore);
    tolerant.load_buffer(&corrupt, 0, corrupt.len()).unwrap();
    assert_eq!(tolerant.tables_count(), 1);
    assert!(!tolerant.tables()[0].is_valid());
}

#[test]
fn test_unknown_element_is_reported() {
    let mut file = SectionFile::default();
    let err = file
        .parse_xml("<tsduck><no_such_table foo=\"1\"/></tsduck>")
        .unwrap_err();
    assert!(matches!(err, SiError::UnknownElement(name) if name == "no_such_table"));
}

#[test]
fn test_json_round_trip() {
    let ctx = SiContext::default();
    let mut file = SectionFile::new(ctx);
    file.parse_xml(PAT1_XML).unwrap();
    let json = file.to_json_string();

    // mechanical structure: #name / #attributes / #nodes, strings only
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["#name"], "tsduck");
    assert_eq!(value["#nodes"][0]["#name"], "pat");
    assert_eq!(value["#nodes"][0]["#attributes"]["transport_stream_id"], "0x0001");

    let mut reloaded = SectionFile::new(ctx);
    reloaded.parse_json(&json).unwrap();
    assert_eq!(reloaded.to_xml_string(), PAT1_XML);
    assert_eq!(reloaded.to_json_string(), json);

    let mut bytes = Vec::new();
    reloaded.save_buffer(&mut bytes);
    assert_eq!(bytes, PAT1_SECTIONS);
}

#[test]
fn test_file_round_trip() -> anyhow::Result<()> {
    let ctx = SiContext::default();
    let dir = std::env::temp_dir();
    let bin_path = dir.join("mpegts_tables_test.bin");
    let xml_path = dir.join("mpegts_tables_test.xml");
    let json_path = dir.join("mpegts_tables_test.json");

    let mut file = SectionFile::new(ctx);
    file.parse_xml(PAT1_XML)?;
    file.save_binary(&bin_path)?;
    file.save_xml(&xml_path)?;
    file.save_json(&json_path)?;

    let mut from_bin = SectionFile::new(ctx);
    from_bin.set_crc_validation(CrcPolicy::Check);
    from_bin.load_binary(&bin_path)?;
    assert_eq!(from_bin.to_xml_string(), PAT1_XML);

    let mut from_xml = SectionFile::new(ctx);
    from_xml.load_xml(&xml_path)?;
    let mut from_json = SectionFile::new(ctx);
    from_json.load_json(&json_path)?;
    for loaded in [&from_xml, &from_json] {
        let mut bytes = Vec::new();
        loaded.save_buffer(&mut bytes);
        assert_eq!(bytes, PAT1_SECTIONS);
    }

    std::fs::remove_file(&bin_path)?;
    std::fs::remove_file(&xml_path)?;
    std::fs::remove_file(&json_path)?;
    Ok(())
}

#[test]
fn test_corrupt_section_keeps_earlier_tables() {
    // first table loads, the second is truncated mid-section
    let mut data = PAT1_SECTIONS.to_vec();
    data.extend_from_slice(&PMT_SCTE35_SECTIONS[..20]);
    let mut file = SectionFile::default();
    let result = file.load_buffer(&data, 0, data.len());
    assert!(matches!(result, Err(SiError::InvalidLength { .. })));
    assert_eq!(file.tables_count(), 1);
    assert_eq!(file.tables()[0].table_id(), TID_PAT);
}

#[test]
fn test_sections_survive_equality_comparison() {
    let (a, _) = Section::parse(PAT1_SECTIONS, CrcPolicy::Check).unwrap();
    let (b, _) = Section::parse(PAT1_SECTIONS, CrcPolicy::Ignore).unwrap();
    assert_eq!(a, b);
    let (c, _) = Section::parse(PMT_SCTE35_SECTIONS, CrcPolicy::Check).unwrap();
    assert_ne!(a, c);
}
