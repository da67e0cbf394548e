//! Control page served at `/`.

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="UTF-8"><meta name="viewport" content="width=device-width,initial-scale=1">
<title>CamBuggy</title>
<style>
body{font-family:Arial,sans-serif;text-align:center;background:#f0f0f0;margin:0;padding:12px}
img{width:100%;max-width:640px;border:2px solid #333;border-radius:5px;background:#000}
.pad{display:grid;grid-template-columns:repeat(3,90px);gap:6px;justify-content:center;margin:12px}
button{padding:16px 0;font-size:16px;border:none;border-radius:5px;background:#4CAF50;color:#fff}
.stop{background:#f44336}.nitro{background:#ff9800}
#status{color:#555}
</style></head>
<body>
<h1>CamBuggy</h1>
<img id="video" alt="stream">
<div class="pad">
<span></span><button data-dir="forward">&uarr;</button><span></span>
<button data-dir="left">&larr;</button><button class="stop" data-dir="stop">&#9632;</button><button data-dir="right">&rarr;</button>
<button class="nitro" data-dir="nitro">N</button><button data-dir="backward">&darr;</button><span></span>
</div>
<p id="status">Ready</p>
<script>
const port = "%STREAM_PORT%";
document.getElementById('video').src = port
  ? location.protocol + '//' + location.hostname + ':' + port + '/stream'
  : '/stream';
function drive(dir) {
  fetch('/drive?dir=' + dir)
    .then(r => r.text())
    .then(t => document.getElementById('status').innerText = dir + ': ' + t)
    .catch(e => document.getElementById('status').innerText = e);
}
document.querySelectorAll('button').forEach(b => {
  const dir = b.dataset.dir;
  if (dir === 'forward' || dir === 'backward') {
    b.addEventListener('pointerdown', () => drive(dir));
    b.addEventListener('pointerup', () => drive('stop'));
  } else {
    b.addEventListener('click', () => drive(dir));
  }
});
const keys = {ArrowUp: 'forward', ArrowDown: 'backward', ArrowLeft: 'left', ArrowRight: 'right', ' ': 'stop', n: 'nitro'};
document.addEventListener('keydown', e => { if (!e.repeat && keys[e.key]) drive(keys[e.key]); });
document.addEventListener('keyup', e => { if (e.key === 'ArrowUp' || e.key === 'ArrowDown') drive('stop'); });
</script>
</body></html>
"#;

/// Render the page. With `stream_port` the video comes from the dedicated
/// stream server, otherwise from `/stream` on the same origin.
pub fn control_page(stream_port: Option<u16>) -> String {
    let port = stream_port.map(|p| p.to_string()).unwrap_or_default();
    TEMPLATE.replace("%STREAM_PORT%", &port)
}
