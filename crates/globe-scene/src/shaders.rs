//! Post-processing fragment shaders
//!
//! Written against the engine's post-process stage contract: the scene color
//! arrives as `colorTexture`, the output goes to `out_FragColor`.

/// Scanlines, RGB mask and blocky pixelation.
pub const CRT_SHADER: &str = r#"
uniform sampler2D colorTexture;
uniform float scanlineIntensity;
uniform float pixelation;
in vec2 v_textureCoordinates;

void main() {
    vec2 size = vec2(textureSize(colorTexture, 0));
    vec2 block = max(pixelation, 1.0) / size;
    vec2 uv = floor(v_textureCoordinates / block) * block + block * 0.5;
    vec3 color = texture(colorTexture, uv).rgb;

    float line = sin(v_textureCoordinates.y * size.y * 3.14159);
    color *= 1.0 - scanlineIntensity * 0.35 * (1.0 - line * line);

    float column = mod(floor(v_textureCoordinates.x * size.x), 3.0);
    vec3 mask = vec3(column == 0.0 ? 1.0 : 0.8, column == 1.0 ? 1.0 : 0.8, column == 2.0 ? 1.0 : 0.8);
    color *= mask;

    vec2 centered = v_textureCoordinates - 0.5;
    color *= 1.0 - dot(centered, centered) * 0.9;

    out_FragColor = vec4(color, 1.0);
}
"#;

/// Luminance mapped onto a black-blue-red-yellow-white ramp.
pub const THERMAL_SHADER: &str = r#"
uniform sampler2D colorTexture;
uniform float sensitivity;
in vec2 v_textureCoordinates;

vec3 ramp(float t) {
    vec3 c0 = vec3(0.0, 0.0, 0.0);
    vec3 c1 = vec3(0.1, 0.0, 0.5);
    vec3 c2 = vec3(0.9, 0.1, 0.1);
    vec3 c3 = vec3(1.0, 0.8, 0.0);
    vec3 c4 = vec3(1.0, 1.0, 1.0);
    if (t < 0.25) return mix(c0, c1, t * 4.0);
    if (t < 0.5) return mix(c1, c2, (t - 0.25) * 4.0);
    if (t < 0.75) return mix(c2, c3, (t - 0.5) * 4.0);
    return mix(c3, c4, (t - 0.75) * 4.0);
}

void main() {
    vec3 color = texture(colorTexture, v_textureCoordinates).rgb;
    float heat = dot(color, vec3(0.299, 0.587, 0.114));
    heat = clamp(pow(heat, 1.0 / max(sensitivity, 0.01)), 0.0, 1.0);
    out_FragColor = vec4(ramp(heat), 1.0);
}
"#;

/// Anamorphic streak and ghosting around bright pixels.
pub const FLARE_SHADER: &str = r#"
uniform sampler2D colorTexture;
in vec2 v_textureCoordinates;

void main() {
    vec2 uv = v_textureCoordinates;
    vec3 base = texture(colorTexture, uv).rgb;
    vec2 texel = 1.0 / vec2(textureSize(colorTexture, 0));

    vec3 streak = vec3(0.0);
    for (int i = -8; i <= 8; i++) {
        vec3 s = texture(colorTexture, uv + vec2(float(i) * texel.x * 6.0, 0.0)).rgb;
        streak += max(s - 0.75, 0.0) / (1.0 + abs(float(i)));
    }

    vec2 ghostUv = vec2(1.0) - uv;
    vec3 ghost = max(texture(colorTexture, ghostUv).rgb - 0.8, 0.0) * vec3(0.4, 0.6, 1.0);

    out_FragColor = vec4(base + streak * vec3(0.6, 0.8, 1.0) + ghost, 1.0);
}
"#;

/// Engine library stages
pub const NIGHT_VISION_BUILTIN: &str = "night_vision";
pub const BLOOM_BUILTIN: &str = "bloom";
