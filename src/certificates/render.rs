// certificates/render.rs — Certificate artifact rendering.
//
// Produces a self-contained SVG page from the persisted certificate fields.
// Deterministic: the same row always renders the same bytes, which keeps the
// write-once upload honest.

use crate::store::CertificateRow;

const PAGE_WIDTH: u32 = 800;
const PAGE_HEIGHT: u32 = 600;

fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_certificate(cert: &CertificateRow) -> Vec<u8> {
    let student = xml_escape(&cert.student_name);
    let course = xml_escape(&cert.course_name);
    let date = xml_escape(&cert.completion_date);
    let id = xml_escape(&cert.id);

    let svg = format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{PAGE_WIDTH}" height="{PAGE_HEIGHT}" viewBox="0 0 {PAGE_WIDTH} {PAGE_HEIGHT}">
  <rect width="{PAGE_WIDTH}" height="{PAGE_HEIGHT}" fill="#fdfaf3"/>
  <rect x="20" y="20" width="{inner_w}" height="{inner_h}" fill="none" stroke="#b08d2f" stroke-width="4"/>
  <text x="400" y="140" text-anchor="middle" font-family="Georgia, serif" font-size="34" fill="#1a1a1a">Certificate of Completion</text>
  <text x="400" y="230" text-anchor="middle" font-family="Georgia, serif" font-size="20" fill="#1a1a1a">This is to certify that</text>
  <text x="400" y="290" text-anchor="middle" font-family="Georgia, serif" font-size="28" fill="#1a1a1a">{student}</text>
  <text x="400" y="350" text-anchor="middle" font-family="Georgia, serif" font-size="20" fill="#1a1a1a">has successfully completed</text>
  <text x="400" y="400" text-anchor="middle" font-family="Georgia, serif" font-size="24" fill="#1a1a1a">{course}</text>
  <text x="400" y="470" text-anchor="middle" font-family="Georgia, serif" font-size="16" fill="#1a1a1a">Completed on: {date}</text>
  <text x="400" y="560" text-anchor="middle" font-family="Georgia, serif" font-size="11" fill="#777777">Certificate ID: {id}</text>
</svg>
"##,
        inner_w = PAGE_WIDTH - 40,
        inner_h = PAGE_HEIGHT - 40,
    );
    svg.into_bytes()
}
