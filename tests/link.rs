mod common;

use coffld::records::{FileHeader, OptionalHeader, OptionalHeader32, Record};
use coffld::utils::align_up;
use coffld::{ImageOptions, Linker, PeImage};
use common::{ObjectBuilder, CODE, IDATA};
use object::read::pe::PeFile32;
use object::{Object, ObjectSection};

fn two_objects() -> (Vec<u8>, Vec<u8>) {
    let first = ObjectBuilder::new()
        .section(".text", CODE, &[0x90; 16])
        .bss(".bss", 0x80)
        .symbol("_main", 0, 1)
        .build();
    let second = ObjectBuilder::new()
        .section(".text$zz", CODE, &[0xCC; 4])
        .symbol("_helper_with_a_long_name", 0, 1)
        .build();
    (first, second)
}

#[test]
fn linked_image_has_expected_geometry() {
    let (first, second) = two_objects();
    let mut linker = Linker::new();
    assert_eq!(linker.add_object(&first).unwrap(), 0);
    assert_eq!(linker.add_object(&second).unwrap(), 1);

    let options = ImageOptions::default();
    let (image, summary) = linker.link(&options).unwrap();
    let bytes = image.write_image().unwrap();

    let optional_at = 64 + 4 + FileHeader::SIZE;
    let header = OptionalHeader32::decode(&bytes, optional_at).unwrap();
    assert_eq!(
        header.size_of_initialized_data,
        align_up(20, options.file_alignment)
    );
    assert_eq!(summary.size_of_initialized_data, header.size_of_initialized_data);

    let bss = image.section(".bss").unwrap();
    assert_eq!(bss.raw_size(), 0);
    assert_eq!(bss.virtual_size(), 0x80);

    let mut expected = vec![0x90; 16];
    expected.extend_from_slice(&[0xCC; 4]);
    assert_eq!(image.get_section_data(".text"), Some(expected.as_slice()));
    assert_eq!(header.size_of_image, 0x3000);
    assert_eq!(bytes.len(), 0x400);
}

#[test]
fn linked_image_is_readable_by_object() {
    let (first, second) = two_objects();
    let mut linker = Linker::new();
    linker.add_object(&first).unwrap();
    linker.add_object(&second).unwrap();
    let (image, _) = linker.link(&ImageOptions::default()).unwrap();
    let bytes = image.write_image().unwrap();

    let pe = PeFile32::parse(&*bytes).unwrap();
    assert_eq!(pe.architecture(), object::Architecture::I386);
    let text = pe.section_by_name(".text").unwrap();
    assert_eq!(text.address(), 0x40_0000 + 0x1000);
    let data = text.data().unwrap();
    assert_eq!(data.len(), 20);
    assert_eq!(&data[16..], &[0xCC; 4]);
    assert!(pe.section_by_name(".bss").is_some());
}

#[test]
fn linked_image_reads_back() {
    let (first, second) = two_objects();
    let mut linker = Linker::new();
    linker.add_object(&first).unwrap();
    linker.add_object(&second).unwrap();
    let (image, _) = linker.link(&ImageOptions::default()).unwrap();
    let bytes = image.write_image().unwrap();

    let reread = PeImage::read(&bytes).unwrap();
    let names: Vec<&str> = reread.sections().iter().map(|s| s.name()).collect();
    assert_eq!(names, [".text", ".bss"]);
    assert_eq!(reread.get_section_data(".text").unwrap().len(), 20);
    assert!(reread.dos_stub().is_empty());
    let OptionalHeader::Pe32(header) = reread.optional_header() else {
        panic!("expected PE32");
    };
    assert_eq!(header.base_of_code, 0x1000);
}

#[test]
fn grouping_follows_ordinals_and_suffixes() {
    let objects = [
        ObjectBuilder::new().section(".text", CODE, b"A").section(".data", IDATA, b"d").build(),
        ObjectBuilder::new().section(".text$mn", CODE, b"B").build(),
        ObjectBuilder::new().section(".text$zz", CODE, b"C").build(),
    ];
    let mut linker = Linker::new();
    for object in &objects {
        linker.add_object(object).unwrap();
    }

    let groups = linker.group_sections();
    assert_eq!(groups.len(), 2);
    let text: Vec<&str> = groups.group(".text").unwrap().members().iter().map(|s| s.name()).collect();
    assert_eq!(text, [".text", ".text$mn", ".text$zz"]);
    let data: Vec<&str> = groups.group(".data").unwrap().members().iter().map(|s| s.name()).collect();
    assert_eq!(data, [".data"]);

    let merged = groups.merge().unwrap();
    assert_eq!(merged[0].name(), ".text");
    assert_eq!(merged[0].data(), b"ABC");
    assert_eq!(merged[1].name(), ".data");
}

#[test]
fn later_objects_follow_earlier_ones_within_a_group() {
    let objects = [
        ObjectBuilder::new().section(".rdata$b", IDATA, b"1").build(),
        ObjectBuilder::new().section(".rdata$a", IDATA, b"2").build(),
        ObjectBuilder::new().section(".rdata$a", IDATA, b"3").section(".rdata", IDATA, b"0").build(),
    ];
    let mut linker = Linker::new();
    for object in &objects {
        linker.add_object(object).unwrap();
    }
    let merged = linker.group_sections().merge().unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].data(), b"0231");
}

#[test]
fn bad_object_aborts_the_session_input() {
    let mut linker = Linker::new();
    let (first, _) = two_objects();
    assert!(linker.add_object(&first[..30]).unwrap_err().is_format_error());
    assert!(linker.objects().is_empty());
    assert_eq!(linker.add_object(&first).unwrap(), 0);
}

#[test]
fn named_and_unnamed_objects_share_ordinals() {
    let (first, second) = two_objects();
    let mut linker = Linker::new();
    assert_eq!(linker.add_object(&first).unwrap(), 0);
    assert!(linker.add_named_object("broken.obj", &second[..30]).is_err());
    assert_eq!(linker.add_named_object("second.obj", &second).unwrap(), 1);
    assert_eq!(linker.add_object(&first).unwrap(), 2);

    let ordinals: Vec<_> = linker.objects().iter().map(|o| (o.ordinal(), o.source())).collect();
    assert_eq!(ordinals, [(0, None), (1, Some("second.obj")), (2, None)]);
}
