use filestream_kit::{AccessMode, BackendKind, FileStream, Hints, Whence};

fn main() {
    let tmp = std::env::temp_dir();
    let path = tmp.join("filestream_hello.txt");
    println!("Temp file: {}", path.display());

    // buffered write: data sits in the 16 KiB buffer until flush or close
    let mut out = FileStream::open(&path, AccessMode::Write, Hints::NONE).unwrap();
    out.printf(format_args!("Hello, {}!\n", "World")).unwrap();
    out.close().unwrap();

    // memory map is honoured because the access is read-only
    let mut input = FileStream::open(&path, AccessMode::Read, Hints::MEMORY_MAP).unwrap();
    assert_eq!(input.backend_kind(), BackendKind::MemoryMapped);
    println!("{} bytes", input.size());

    let line = input.getline().unwrap();
    println!("{}", line);
    assert!(input.eof());

    // seeking past the mapping fails and leaves the cursor alone
    assert!(input.seek(1, Whence::End).is_err());
    assert!(input.error());

    // rewind moves back to the start and clears the error
    input.rewind();
    assert!(!input.error());
    input.close().unwrap();

    FileStream::delete(&path);
}
