use cc;

fn main() {
    cc::Build::new()
        .file("src/sysdeps/frame_pad.c")
        .compile("sysdeps_frame_pad");
}
